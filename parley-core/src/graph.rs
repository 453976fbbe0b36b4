//! Reference execution engine: a two-node ReAct loop.
//!
//! The `agent` node calls the chat model and streams its chunks on the
//! tokens channel. When the reply requests tools, the `tools` node runs them
//! in order and hands the results back to the model. The loop ends when the
//! model answers without tool calls, and the turn is saved as one checkpoint.
//!
//! Turns on the same thread run one at a time: a turn takes the thread's
//! lock before it reads the stored state and releases it after the save, so
//! a completed turn is never overwritten by a concurrent one.
//!
//! A tool may interrupt the run. The engine then saves a checkpoint holding a
//! [`PendingTask`] and ends the stream; the next run with
//! [`EngineInput::Resume`] re-invokes the interrupted tool with the resume
//! value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Mutex as TurnLock, OwnedMutexGuard};

use crate::chat::ToolCall;
use crate::engine::{
    EngineError, EngineEvent, EngineInput, EngineSnapshot, EngineStream, ExecutionEngine,
    Interrupt, NodeUpdate, PendingTask, RunConfig, TokenMetadata,
};
use crate::message::{AiMessage, MessageContent, RawMessage, ToolMessage};
use crate::normalize::gather_tool_calls;
use crate::provider::{ChatModel, ModelRequest, ToolSpec};
use crate::store::{Checkpoint, CheckpointMetadata, ConversationState, ConversationStore};
use crate::tool::{box_tool, DynTool, Tool, ToolOutput};

/// Node that calls the model.
pub const AGENT_NODE: &str = "agent";

/// Node that runs tools.
pub const TOOLS_NODE: &str = "tools";

/// Default maximum number of model calls per turn.
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Errors that can occur when building a [`ReactGraph`].
#[derive(Debug, thiserror::Error)]
pub enum GraphBuildError {
    #[error("No chat model configured. Call .model() before .build()")]
    NoModel,

    #[error("No conversation store configured. Call .store() before .build()")]
    NoStore,

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),
}

struct GraphInner {
    model: Arc<dyn ChatModel>,
    tools: HashMap<String, Box<dyn DynTool>>,
    tool_specs: Vec<ToolSpec>,
    store: Arc<dyn ConversationStore>,
    system_prompt: Option<String>,
    max_steps: usize,
    turn_locks: Mutex<HashMap<String, Arc<TurnLock<()>>>>,
}

/// ReAct engine over a [`ChatModel`], a set of tools and a
/// [`ConversationStore`].
#[derive(Clone)]
pub struct ReactGraph {
    inner: Arc<GraphInner>,
}

impl ReactGraph {
    pub fn builder() -> ReactGraphBuilder {
        ReactGraphBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.inner.store
    }

    pub fn max_steps(&self) -> usize {
        self.inner.max_steps
    }
}

/// Builder for [`ReactGraph`].
#[derive(Default)]
pub struct ReactGraphBuilder {
    model: Option<Arc<dyn ChatModel>>,
    tools: Vec<Box<dyn DynTool>>,
    store: Option<Arc<dyn ConversationStore>>,
    system_prompt: Option<String>,
    max_steps: Option<usize>,
}

impl ReactGraphBuilder {
    pub fn model(mut self, model: impl ChatModel + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn shared_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn add_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(box_tool(tool));
        self
    }

    pub fn add_tools(mut self, tools: Vec<Box<dyn DynTool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn build(self) -> Result<ReactGraph, GraphBuildError> {
        let model = self.model.ok_or(GraphBuildError::NoModel)?;
        let store = self.store.ok_or(GraphBuildError::NoStore)?;

        let mut tools = HashMap::new();
        let mut tool_specs = Vec::with_capacity(self.tools.len());
        for tool in self.tools {
            let name = tool.name().to_string();
            if tools.contains_key(&name) {
                return Err(GraphBuildError::DuplicateTool(name));
            }
            tool_specs.push(ToolSpec {
                name: name.clone(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            });
            tools.insert(name, tool);
        }

        Ok(ReactGraph {
            inner: Arc::new(GraphInner {
                model,
                tools,
                tool_specs,
                store,
                system_prompt: self.system_prompt,
                max_steps: self.max_steps.unwrap_or(DEFAULT_MAX_STEPS),
                turn_locks: Mutex::new(HashMap::new()),
            }),
        })
    }
}

enum ToolStep {
    Message(RawMessage),
    Interrupt(Value),
}

impl GraphInner {
    /// Wait until no other turn is running on `thread_id`.
    async fn lock_thread(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock();
            // Unused entries have no guard or waiter holding a clone.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(thread_id.to_string())
                .or_insert_with(|| Arc::new(TurnLock::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    async fn load(&self, thread_id: &str) -> Result<ConversationState, EngineError> {
        Ok(self.store.get_state(thread_id).await?.unwrap_or_default())
    }

    fn model_request(&self, messages: &[RawMessage]) -> ModelRequest {
        ModelRequest {
            system_prompt: self.system_prompt.clone(),
            messages: messages.to_vec(),
            tools: self.tool_specs.clone(),
        }
    }

    async fn invoke_tool(&self, call: &ToolCall, resume: Option<String>) -> ToolStep {
        let call_id = call.id.clone().unwrap_or_default();
        let reply = |content: String| {
            ToolStep::Message(RawMessage::Tool(ToolMessage {
                content: MessageContent::Text(content),
                tool_call_id: call_id.clone(),
                name: Some(call.name.clone()),
                id: None,
            }))
        };

        let Some(tool) = self.tools.get(&call.name) else {
            tracing::warn!(tool = %call.name, "model requested an unknown tool");
            return reply(format!("Error: tool '{}' not found", call.name));
        };

        match tool
            .execute_raw(Value::Object(call.args.clone()), resume)
            .await
        {
            Ok(ToolOutput::Text(text)) => reply(text),
            Ok(ToolOutput::Interrupt(value)) => ToolStep::Interrupt(value),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool failed");
                reply(format!("Error: {}", e))
            }
        }
    }

    async fn save(
        &self,
        config: &RunConfig,
        messages: Vec<RawMessage>,
        pending: Vec<PendingTask>,
    ) -> Result<(), EngineError> {
        let interrupted = !pending.is_empty();
        let state = ConversationState {
            messages,
            pending,
            metadata: CheckpointMetadata::from(config),
        };
        self.store
            .put_checkpoint(Checkpoint::new(config.thread_id.clone(), state))
            .await?;
        tracing::info!(thread_id = %config.thread_id, interrupted, "turn saved");
        Ok(())
    }
}

/// Merge one streamed chunk into the reply being assembled.
fn merge_chunk(reply: &mut AiMessage, chunk: AiMessage) {
    let text = crate::formatter::token_text(&chunk);
    if !text.is_empty() {
        let mut content = reply.content.text();
        content.push_str(&text);
        reply.content = MessageContent::Text(content);
    }
    reply.tool_calls.extend(chunk.tool_calls);
    reply.additional_kwargs.extend(chunk.additional_kwargs);
    reply.response_metadata.extend(chunk.response_metadata);
    if reply.id.is_none() {
        reply.id = chunk.id;
    }
}

/// Where a turn starts.
struct Turn {
    messages: Vec<RawMessage>,
    resume: Option<(PendingTask, String)>,
}

impl Turn {
    fn prepare(
        prior: ConversationState,
        input: EngineInput,
        thread_id: &str,
    ) -> Result<Self, EngineError> {
        match input {
            EngineInput::Fresh(new_messages) => {
                let mut messages = prior.messages;
                messages.extend(new_messages);
                Ok(Self {
                    messages,
                    resume: None,
                })
            }
            EngineInput::Resume(value) => {
                let task = prior
                    .pending
                    .into_iter()
                    .find(PendingTask::is_interrupted)
                    .ok_or_else(|| EngineError::NothingToResume(thread_id.to_string()))?;
                Ok(Self {
                    messages: prior.messages,
                    resume: Some((task, value)),
                })
            }
        }
    }
}

fn run_turn(inner: Arc<GraphInner>, input: EngineInput, config: RunConfig) -> EngineStream {
    let stream = async_stream::stream! {
        let _turn_guard = inner.lock_thread(&config.thread_id).await;
        // Read under the lock: a turn that finished while this one waited is
        // part of the history.
        let turn = match inner
            .load(&config.thread_id)
            .await
            .and_then(|prior| Turn::prepare(prior, input, &config.thread_id))
        {
            Ok(turn) => turn,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        tracing::debug!(
            model = %inner.model.name(),
            history = turn.messages.len(),
            resume = turn.resume.is_some(),
            "starting turn"
        );

        let Turn { mut messages, resume } = turn;
        let (mut pending_calls, mut resume_value) = match resume {
            Some((task, value)) => (task.tool_calls, Some(value)),
            None => (Vec::new(), None),
        };
        let mut steps = 0usize;
        let mut pending_tasks: Vec<PendingTask> = Vec::new();

        'turn: loop {
            if pending_calls.is_empty() {
                steps += 1;
                if steps > inner.max_steps {
                    tracing::warn!(max_steps = inner.max_steps, "recursion limit reached");
                    yield Err(EngineError::RecursionLimit(inner.max_steps));
                    return;
                }

                let mut chunks = match inner.model.stream(inner.model_request(&messages)).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                let mut reply = AiMessage::default();
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(chunk) => {
                            yield Ok(EngineEvent::token(
                                RawMessage::AiChunk(chunk.clone()),
                                TokenMetadata::node(AGENT_NODE),
                            ));
                            merge_chunk(&mut reply, chunk);
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }

                reply
                    .additional_kwargs
                    .insert("ai_call_id".to_string(), Value::String(config.ai_call_id.clone()));
                if reply.id.is_none() {
                    reply.id = Some(format!("run-{}-{}", config.run_id, steps));
                }

                pending_calls = gather_tool_calls(&reply);
                let message = RawMessage::Ai(reply);
                messages.push(message.clone());
                yield Ok(EngineEvent::update(NodeUpdate::messages(AGENT_NODE, vec![message])));

                if pending_calls.is_empty() {
                    break 'turn;
                }
            }

            let calls = std::mem::take(&mut pending_calls);
            for (index, call) in calls.iter().enumerate() {
                match inner.invoke_tool(call, resume_value.take()).await {
                    ToolStep::Message(message) => {
                        messages.push(message.clone());
                        yield Ok(EngineEvent::token(message.clone(), TokenMetadata::node(TOOLS_NODE)));
                        yield Ok(EngineEvent::update(NodeUpdate::messages(TOOLS_NODE, vec![message])));
                    }
                    ToolStep::Interrupt(value) => {
                        let interrupt = Interrupt::new(value);
                        tracing::info!(tool = %call.name, interrupt_id = %interrupt.id, "tool interrupted");
                        pending_tasks.push(PendingTask {
                            id: uuid::Uuid::new_v4().to_string(),
                            name: TOOLS_NODE.to_string(),
                            interrupts: vec![interrupt.clone()],
                            tool_calls: calls[index..].to_vec(),
                        });
                        yield Ok(EngineEvent::update(NodeUpdate::interrupts(vec![interrupt])));
                        break 'turn;
                    }
                }
            }
        }

        if let Err(e) = inner.save(&config, messages, pending_tasks).await {
            yield Err(e);
        }
    };

    Box::pin(stream)
}

#[async_trait]
impl ExecutionEngine for ReactGraph {
    async fn get_state(&self, config: &RunConfig) -> Result<EngineSnapshot, EngineError> {
        let state = self.inner.store.get_state(&config.thread_id).await?;
        Ok(state
            .map(ConversationState::into_snapshot)
            .unwrap_or_default())
    }

    async fn stream(
        &self,
        input: EngineInput,
        config: RunConfig,
    ) -> Result<EngineStream, EngineError> {
        // Fail fast on a resume with nothing pending. The turn itself
        // re-reads the state once it holds the thread lock.
        if let EngineInput::Resume(_) = &input {
            let prior = self.inner.load(&config.thread_id).await?;
            if !prior.is_interrupted() {
                return Err(EngineError::NothingToResume(config.thread_id.clone()));
            }
        }

        Ok(run_turn(self.inner.clone(), input, config))
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
