//! Events of the client-facing stream.

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::error::Error;

/// Terminal line of every stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Content of an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    pub recoverable: bool,
    pub error_type: String,
}

impl ErrorPayload {
    /// A single message could not be formatted; the stream continues.
    pub fn message_formatting() -> Self {
        Self {
            message: "Message formatting error".to_string(),
            recoverable: true,
            error_type: "message_formatting_error".to_string(),
        }
    }

    /// The run failed; nothing else follows but the sentinel.
    pub fn agent_error() -> Self {
        Self {
            message: "Internal server error".to_string(),
            recoverable: false,
            error_type: "agent_error".to_string(),
        }
    }
}

/// One event sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputEvent {
    /// A complete, normalized message.
    Message { content: ChatMessage },
    /// A text delta of the model's reply.
    Token {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },
    Error { content: ErrorPayload },
}

impl OutputEvent {
    pub fn message(content: ChatMessage) -> Self {
        OutputEvent::Message { content }
    }

    pub fn token(content: impl Into<String>, tool_call_id: Option<String>) -> Self {
        OutputEvent::Token {
            content: content.into(),
            tool_call_id,
        }
    }

    pub fn formatting_error() -> Self {
        OutputEvent::Error {
            content: ErrorPayload::message_formatting(),
        }
    }

    pub fn agent_error() -> Self {
        OutputEvent::Error {
            content: ErrorPayload::agent_error(),
        }
    }

    /// The client-facing event for a failure: recoverable errors become a
    /// formatting error, everything else an agent error.
    pub fn from_error(err: &Error) -> Self {
        if err.is_recoverable() {
            Self::formatting_error()
        } else {
            Self::agent_error()
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            OutputEvent::Message { .. } => "message",
            OutputEvent::Token { .. } => "token",
            OutputEvent::Error { .. } => "error",
        }
    }
}

/// An item of the outbound stream: an event or the terminal sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Event(OutputEvent),
    Done,
}

impl StreamItem {
    /// Wire form: one compact JSON object or the sentinel, newline terminated.
    pub fn to_line(&self) -> String {
        match self {
            StreamItem::Event(event) => {
                let json = serde_json::to_string(event).unwrap_or_else(|e| {
                    tracing::error!(error = %e, "failed to serialize output event");
                    serde_json::json!({
                        "type": "error",
                        "content": ErrorPayload::message_formatting(),
                    })
                    .to_string()
                });
                format!("{}\n", json)
            }
            StreamItem::Done => format!("{}\n", DONE_SENTINEL),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamItem::Done)
    }
}

impl From<OutputEvent> for StreamItem {
    fn from(event: OutputEvent) -> Self {
        StreamItem::Event(event)
    }
}
