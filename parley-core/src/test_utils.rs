//! Test utilities for parley-core.
//!
//! Scripted collaborators for exercising the session layer and the
//! reference engine without a real model.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! parley-core = { version = "...", features = ["test-utils"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parley_core::graph::ReactGraph;
//! use parley_core::store::MemoryConversationStore;
//! use parley_core::test_utils::MockChatModel;
//!
//! let model = MockChatModel::new().with_text("Hello from mock!");
//! let graph = ReactGraph::builder()
//!     .model(model)
//!     .store(Arc::new(MemoryConversationStore::new()))
//!     .build()
//!     .unwrap();
//! assert_eq!(graph.max_steps(), 25);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::engine::{
    EngineError, EngineEvent, EngineInput, EngineSnapshot, EngineStream, ExecutionEngine,
    RunConfig,
};
use crate::message::AiMessage;
use crate::provider::{ChatModel, ChunkStream, ModelRequest};
use crate::tool::{Tool, ToolError, ToolOutput};

/// A chat model that replays pre-programmed replies in order.
///
/// Text replies are streamed word by word so token handling gets exercised.
///
/// ```rust
/// use parley_core::test_utils::MockChatModel;
/// use serde_json::json;
///
/// // Tool call followed by final answer
/// let model = MockChatModel::new()
///     .with_tool_call("multiply", json!({"a": 15, "b": 24}))
///     .with_text("15 times 24 is 360");
/// ```
#[derive(Clone, Default)]
pub struct MockChatModel {
    replies: Arc<Mutex<VecDeque<Vec<AiMessage>>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a text reply.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        let text = text.into();
        let chunks = split_words(&text)
            .into_iter()
            .map(AiMessage::text)
            .collect();
        self.replies.lock().push_back(chunks);
        self
    }

    /// Queue a reply that calls one tool.
    pub fn with_tool_call(self, name: impl Into<String>, args: Value) -> Self {
        let id = format!("call_{}", uuid::Uuid::new_v4().simple());
        self.with_tool_call_id(name, args, id)
    }

    /// Queue a reply that calls one tool with a known call id.
    pub fn with_tool_call_id(
        self,
        name: impl Into<String>,
        args: Value,
        id: impl Into<String>,
    ) -> Self {
        let chunk = AiMessage::default().with_tool_call(name, args, id);
        self.replies.lock().push_back(vec![chunk]);
        self
    }

    /// Queue a reply made of explicit chunks.
    pub fn with_chunks(self, chunks: Vec<AiMessage>) -> Self {
        self.replies.lock().push_back(chunks);
        self
    }

    /// Number of times the model was called.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }
}

/// Split text into chunks that concatenate back to it, keeping spaces.
fn split_words(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch == ' ' {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn name(&self) -> &str {
        "MockChatModel"
    }

    async fn stream(&self, request: ModelRequest) -> Result<ChunkStream, EngineError> {
        self.requests.lock().push(request);

        let chunks = self.replies.lock().pop_front().ok_or_else(|| {
            EngineError::Model("MockChatModel: No more responses configured".to_string())
        })?;

        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}

/// Scripted execution engine.
///
/// Returns a fixed snapshot from `get_state` and replays a fixed event
/// script from `stream`, recording every input it receives.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    snapshot: Arc<Mutex<EngineSnapshot>>,
    script: Arc<Mutex<Vec<Result<EngineEvent, String>>>>,
    inputs: Arc<Mutex<Vec<EngineInput>>>,
    configs: Arc<Mutex<Vec<RunConfig>>>,
    fail_get_state: bool,
    fail_stream: bool,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `snapshot` as the thread's persisted state.
    pub fn with_snapshot(self, snapshot: EngineSnapshot) -> Self {
        *self.snapshot.lock() = snapshot;
        self
    }

    /// Append an event to the script.
    pub fn with_event(self, event: EngineEvent) -> Self {
        self.script.lock().push(Ok(event));
        self
    }

    /// Append a mid-stream failure to the script.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.script.lock().push(Err(message.into()));
        self
    }

    /// Fail the state lookup.
    pub fn failing_get_state(mut self) -> Self {
        self.fail_get_state = true;
        self
    }

    /// Fail before the first event.
    pub fn failing_stream(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    /// Inputs received by `stream`, in order.
    pub fn inputs(&self) -> Vec<EngineInput> {
        self.inputs.lock().clone()
    }

    /// Run configurations received by `stream`, in order.
    pub fn configs(&self) -> Vec<RunConfig> {
        self.configs.lock().clone()
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn get_state(&self, _config: &RunConfig) -> Result<EngineSnapshot, EngineError> {
        if self.fail_get_state {
            return Err(EngineError::Other("scripted state failure".to_string()));
        }
        Ok(self.snapshot.lock().clone())
    }

    async fn stream(
        &self,
        input: EngineInput,
        config: RunConfig,
    ) -> Result<EngineStream, EngineError> {
        self.inputs.lock().push(input);
        self.configs.lock().push(config);
        if self.fail_stream {
            return Err(EngineError::Other("scripted stream failure".to_string()));
        }

        let events: Vec<_> = self
            .script
            .lock()
            .iter()
            .cloned()
            .map(|step| step.map_err(EngineError::Other))
            .collect();
        Ok(Box::pin(stream::iter(events)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EchoInput {
    /// Text to echo back
    pub text: String,
}

/// A tool that returns its `text` argument.
pub struct EchoTool;

impl Tool for EchoTool {
    type Input = EchoInput;

    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input text"
    }

    async fn execute(
        &self,
        input: Self::Input,
        _resume: Option<String>,
    ) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::Text(input.text))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ApprovalInput {
    /// Action awaiting approval
    pub action: String,
}

/// A tool that asks for approval before acting.
///
/// Without a resume value it interrupts with a question; with one it reports
/// the decision.
pub struct ApprovalTool;

impl Tool for ApprovalTool {
    type Input = ApprovalInput;

    fn name(&self) -> &str {
        "approve"
    }

    fn description(&self) -> &str {
        "Ask the user to approve an action"
    }

    async fn execute(
        &self,
        input: Self::Input,
        resume: Option<String>,
    ) -> Result<ToolOutput, ToolError> {
        Ok(match resume {
            None => ToolOutput::Interrupt(Value::String(format!("Approve {}?", input.action))),
            Some(answer) => ToolOutput::Text(format!("{}: {}", input.action, answer)),
        })
    }
}
