//! Contract between the session layer and an execution engine.
//!
//! An engine runs one turn of a conversation and reports progress on three
//! channels: node state updates, model token deltas and custom payloads.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ToolCall;
use crate::message::RawMessage;
use crate::store::StoreError;

/// Node name under which an engine reports interrupts.
pub const INTERRUPT_NODE: &str = "__interrupt__";

/// Token metadata tag that suppresses a chunk from the token stream.
pub const SKIP_STREAM_TAG: &str = "skip_stream";

/// Prefix of per-generation identifiers.
pub const AI_CALL_PREFIX: &str = "ai_call_";

/// A paused execution point awaiting external input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: String,
    pub value: Value,
}

impl Interrupt {
    pub fn new(value: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            value,
        }
    }

    /// Display text of the interrupt payload: strings verbatim, any other
    /// JSON as compact text.
    pub fn content(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// A task that stopped on one or more interrupts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub interrupts: Vec<Interrupt>,
    /// Tool calls still to execute when the task resumes, the interrupted one
    /// first.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl PendingTask {
    pub fn is_interrupted(&self) -> bool {
        !self.interrupts.is_empty()
    }
}

/// One entry of a node's update list.
///
/// Engines may report a message either whole or as a run of `(key, value)`
/// fragments, which [`crate::reassembly`] stitches back together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateItem {
    Message(RawMessage),
    Fragment(String, Value),
}

impl UpdateItem {
    pub fn fragment(key: impl Into<String>, value: Value) -> Self {
        UpdateItem::Fragment(key.into(), value)
    }

    pub fn as_message(&self) -> Option<&RawMessage> {
        match self {
            UpdateItem::Message(message) => Some(message),
            UpdateItem::Fragment(..) => None,
        }
    }
}

impl From<RawMessage> for UpdateItem {
    fn from(message: RawMessage) -> Self {
        UpdateItem::Message(message)
    }
}

/// What a node reported.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    Messages(Vec<UpdateItem>),
    Interrupts(Vec<Interrupt>),
    /// The node ran but changed no messages.
    Empty,
}

/// The update reported by a single node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub node: String,
    pub payload: UpdatePayload,
}

impl NodeUpdate {
    pub fn messages(node: impl Into<String>, messages: Vec<RawMessage>) -> Self {
        Self::items(node, messages.into_iter().map(UpdateItem::Message).collect())
    }

    pub fn items(node: impl Into<String>, items: Vec<UpdateItem>) -> Self {
        Self {
            node: node.into(),
            payload: UpdatePayload::Messages(items),
        }
    }

    pub fn interrupts(interrupts: Vec<Interrupt>) -> Self {
        Self {
            node: INTERRUPT_NODE.to_string(),
            payload: UpdatePayload::Interrupts(interrupts),
        }
    }

    pub fn empty(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            payload: UpdatePayload::Empty,
        }
    }

    /// Complete messages in this update, in order.
    pub fn complete_messages(&self) -> impl Iterator<Item = &RawMessage> {
        let items = match &self.payload {
            UpdatePayload::Messages(items) => items.as_slice(),
            _ => &[],
        };
        items.iter().filter_map(UpdateItem::as_message)
    }
}

/// Metadata accompanying a token chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenMetadata {
    pub node: Option<String>,
    pub tags: Vec<String>,
}

impl TokenMetadata {
    pub fn node(node: impl Into<String>) -> Self {
        Self {
            node: Some(node.into()),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn skips_stream(&self) -> bool {
        self.tags.iter().any(|tag| tag == SKIP_STREAM_TAG)
    }
}

/// A streamed message chunk together with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEvent {
    pub chunk: RawMessage,
    pub metadata: TokenMetadata,
}

/// One event from an engine, tagged by channel.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Ordered node updates of one engine step.
    Updates(Vec<NodeUpdate>),
    Tokens(TokenEvent),
    /// An opaque payload expected to decode as a [`RawMessage`].
    Custom(Value),
}

impl EngineEvent {
    pub fn update(update: NodeUpdate) -> Self {
        EngineEvent::Updates(vec![update])
    }

    pub fn token(chunk: RawMessage, metadata: TokenMetadata) -> Self {
        EngineEvent::Tokens(TokenEvent { chunk, metadata })
    }
}

/// Input for one engine turn.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineInput {
    /// New messages appended to the thread's history.
    Fresh(Vec<RawMessage>),
    /// A value handed to the interrupted task.
    Resume(String),
}

impl EngineInput {
    /// A fresh turn carrying one human message.
    pub fn human_turn(message: impl Into<String>) -> Self {
        EngineInput::Fresh(vec![RawMessage::human(message.into())])
    }

    pub fn is_resume(&self) -> bool {
        matches!(self, EngineInput::Resume(_))
    }
}

/// Correlation identifiers for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub run_id: String,
    /// Unique per AI generation turn, `ai_call_<uuid>`.
    pub ai_call_id: String,
    pub thread_id: String,
    pub session_id: String,
    pub user_id: String,
}

impl RunConfig {
    /// Mint a new run on the given thread.
    pub fn new(
        thread_id: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            ai_call_id: format!("{}{}", AI_CALL_PREFIX, uuid::Uuid::new_v4()),
            thread_id: thread_id.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// What an engine knows about a thread before a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSnapshot {
    pub messages: Vec<RawMessage>,
    pub tasks: Vec<PendingTask>,
}

impl EngineSnapshot {
    /// True when any pending task is waiting on an interrupt.
    pub fn is_interrupted(&self) -> bool {
        self.tasks.iter().any(PendingTask::is_interrupted)
    }
}

/// Errors that end an engine run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Resume requested on a thread with no interrupted task.
    #[error("Nothing to resume on thread {0}")]
    NothingToResume(String),

    #[error("Recursion limit of {0} steps reached")]
    RecursionLimit(usize),

    #[error("{0}")]
    Other(String),
}

/// Event stream of one engine run.
pub type EngineStream = BoxStream<'static, Result<EngineEvent, EngineError>>;

/// An execution engine that can run conversation turns.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Current persisted state of the run's thread.
    async fn get_state(&self, config: &RunConfig) -> Result<EngineSnapshot, EngineError>;

    /// Start a run and return its event stream.
    async fn stream(
        &self,
        input: EngineInput,
        config: RunConfig,
    ) -> Result<EngineStream, EngineError>;
}
