//! Translation of engine events into client events.
//!
//! [`EventFormatter`] holds the per-stream state (correlation ids and the
//! [`ToolCallTracker`]) and turns each [`EngineEvent`] into zero or more
//! [`OutputEvent`]s in a single pass.

use serde_json::Value;

use crate::chat::ChatMessage;
use crate::engine::{EngineEvent, NodeUpdate, RunConfig, TokenEvent, UpdateItem, UpdatePayload};
use crate::error::Error;
use crate::events::OutputEvent;
use crate::message::{flatten_content, remove_tool_calls, AiMessage, RawMessage, ToolMessage};
use crate::normalize::{normalize, NormalizeError};
use crate::reassembly::{reassemble, FragmentError};
use crate::tracker::{chunk_tool_call_id, ToolCallTracker};

/// Default supervisor node name.
pub const DEFAULT_SUPERVISOR_NODE: &str = "supervisor";

/// Default expert node names.
pub const DEFAULT_EXPERT_NODES: &[&str] = &["research_expert", "math_expert"];

/// Why a single item could not be formatted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error("custom payload is not a message: {0}")]
    CustomPayload(String),
}

/// Node-name conventions and token settings of a formatter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatterOptions {
    /// Node whose update is reduced to its last AI message.
    pub supervisor_node: Option<String>,
    /// Nodes whose first message is surfaced as a tool result.
    pub expert_nodes: Vec<String>,
    /// Emit `token` events for model deltas.
    pub stream_tokens: bool,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            supervisor_node: Some(DEFAULT_SUPERVISOR_NODE.to_string()),
            expert_nodes: DEFAULT_EXPERT_NODES.iter().map(|s| s.to_string()).collect(),
            stream_tokens: true,
        }
    }
}

impl FormatterOptions {
    pub fn with_stream_tokens(mut self, stream_tokens: bool) -> Self {
        self.stream_tokens = stream_tokens;
        self
    }

    fn is_supervisor(&self, node: &str) -> bool {
        self.supervisor_node.as_deref() == Some(node)
    }

    fn is_expert(&self, node: &str) -> bool {
        self.expert_nodes.iter().any(|expert| expert == node)
    }
}

/// Per-stream event formatter.
#[derive(Debug)]
pub struct EventFormatter {
    run_id: String,
    thread_id: String,
    session_id: String,
    options: FormatterOptions,
    tracker: ToolCallTracker,
}

impl EventFormatter {
    pub fn new(config: &RunConfig, options: FormatterOptions) -> Self {
        Self {
            run_id: config.run_id.clone(),
            thread_id: config.thread_id.clone(),
            session_id: config.session_id.clone(),
            options,
            tracker: ToolCallTracker::new(),
        }
    }

    pub fn tracker(&self) -> &ToolCallTracker {
        &self.tracker
    }

    /// Format one engine event. The tracker observes the event first.
    pub fn format(&mut self, event: &EngineEvent) -> Vec<OutputEvent> {
        self.tracker.observe(event);

        match event {
            EngineEvent::Updates(updates) => self.format_updates(updates),
            EngineEvent::Tokens(token) => self.format_token(token).into_iter().collect(),
            EngineEvent::Custom(payload) => vec![self.format_custom(payload)],
        }
    }

    fn format_updates(&self, updates: &[NodeUpdate]) -> Vec<OutputEvent> {
        let mut items = Vec::new();
        for update in updates {
            items.extend(self.node_items(update));
        }

        reassemble(items)
            .into_iter()
            .map(|result| {
                let formatted = result
                    .map_err(FormatError::from)
                    .and_then(|message| normalize(&message).map_err(FormatError::from));
                self.emit(formatted)
            })
            .collect()
    }

    /// Apply the node-name conventions to one node's update.
    fn node_items(&self, update: &NodeUpdate) -> Vec<UpdateItem> {
        match &update.payload {
            UpdatePayload::Interrupts(interrupts) => interrupts
                .iter()
                .map(|interrupt| UpdateItem::Message(RawMessage::ai(interrupt.content())))
                .collect(),
            UpdatePayload::Messages(items) if self.options.is_supervisor(&update.node) => {
                let last_ai = items
                    .iter()
                    .rev()
                    .filter_map(UpdateItem::as_message)
                    .find(|message| message.is_ai());
                match last_ai {
                    Some(message) => vec![UpdateItem::Message(message.clone())],
                    None => items.clone(),
                }
            }
            UpdatePayload::Messages(items) if self.options.is_expert(&update.node) => {
                match items.first() {
                    Some(UpdateItem::Message(first)) => {
                        vec![UpdateItem::Message(RawMessage::Tool(ToolMessage {
                            content: first.content().clone(),
                            tool_call_id: String::new(),
                            name: Some(update.node.clone()),
                            id: None,
                        }))]
                    }
                    _ => items.clone(),
                }
            }
            UpdatePayload::Messages(items) => items.clone(),
            UpdatePayload::Empty => Vec::new(),
        }
    }

    fn format_token(&self, token: &TokenEvent) -> Option<OutputEvent> {
        if !self.options.stream_tokens || token.metadata.skips_stream() {
            return None;
        }
        let RawMessage::AiChunk(chunk) = &token.chunk else {
            return None;
        };

        let text = token_text(chunk);
        if text.is_empty() {
            return None;
        }

        let tool_call_id = chunk_tool_call_id(&token.chunk)
            .or_else(|| self.tracker.current().map(str::to_owned));
        Some(OutputEvent::token(text, tool_call_id))
    }

    fn format_custom(&self, payload: &Value) -> OutputEvent {
        let formatted = serde_json::from_value::<RawMessage>(payload.clone())
            .map_err(|e| FormatError::CustomPayload(e.to_string()))
            .and_then(|message| normalize(&message).map_err(FormatError::from));
        self.emit(formatted)
    }

    fn emit(&self, formatted: Result<ChatMessage, FormatError>) -> OutputEvent {
        match formatted {
            Ok(message) => OutputEvent::message(message.with_correlation(
                self.run_id.as_str(),
                self.thread_id.as_str(),
                self.session_id.as_str(),
            )),
            Err(e) => {
                let err = Error::from(e);
                tracing::warn!(error = %err, "message formatting failed");
                OutputEvent::from_error(&err)
            }
        }
    }
}

/// Streamable text of a chunk: tool-use parts removed, then flattened.
pub fn token_text(chunk: &AiMessage) -> String {
    flatten_content(&remove_tool_calls(&chunk.content))
}

#[cfg(test)]
#[path = "formatter_tests.rs"]
mod tests;
