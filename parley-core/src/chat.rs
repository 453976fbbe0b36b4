//! Wire-level chat messages.

use serde::{Deserialize, Serialize};

use crate::message::JsonObject;

/// Kind of a normalized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Human,
    Ai,
    Tool,
    Custom,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Human => "human",
            MessageType::Ai => "ai",
            MessageType::Tool => "tool",
            MessageType::Custom => "custom",
        }
    }
}

/// Discriminator for [`ToolCall`]. Always serializes as `"tool_call"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolCallType {
    #[default]
    #[serde(rename = "tool_call")]
    ToolCall,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: JsonObject,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub call_type: ToolCallType,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: JsonObject, id: Option<String>) -> Self {
        Self {
            name: name.into(),
            args,
            id,
            call_type: ToolCallType::ToolCall,
        }
    }
}

/// The unit of conversation exposed to clients.
///
/// `tool_call_id` is only ever set on tool messages and `tool_calls` is only
/// ever non-empty on AI messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub response_metadata: JsonObject,
    #[serde(default, skip_serializing_if = "JsonObject::is_empty")]
    pub custom_data: JsonObject,
}

impl ChatMessage {
    pub fn new(message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            message_type,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            run_id: None,
            thread_id: None,
            session_id: None,
            ai_call_id: None,
            response_metadata: JsonObject::new(),
            custom_data: JsonObject::new(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(MessageType::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageType::Ai, content)
    }

    /// Stamp the stream's correlation identifiers onto this message.
    pub fn with_correlation(
        mut self,
        run_id: impl Into<String>,
        thread_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        self.run_id = Some(run_id.into());
        self.thread_id = Some(thread_id.into());
        self.session_id = Some(session_id.into());
        self
    }
}
