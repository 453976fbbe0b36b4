//! Engine-side message representation.
//!
//! [`RawMessage`] is what an execution engine stores and emits. It is richer
//! and looser than the wire-level [`ChatMessage`](crate::chat::ChatMessage):
//! content may be a list of typed parts, and tool calls are kept as plain JSON
//! objects so that partially formed entries survive until normalization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object.
pub type JsonObject = Map<String, Value>;

/// One element of list-shaped message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    /// A bare string part.
    Text(String),
    /// A tagged object such as `{"type": "text", "text": "..."}`.
    Block(JsonObject),
}

impl ContentPart {
    /// Build a `{"type": "text"}` block.
    pub fn text_block(text: impl Into<String>) -> Self {
        let mut block = JsonObject::new();
        block.insert("type".to_string(), Value::String("text".to_string()));
        block.insert("text".to_string(), Value::String(text.into()));
        ContentPart::Block(block)
    }

    /// The `"type"` tag of a block part.
    pub fn tag(&self) -> Option<&str> {
        match self {
            ContentPart::Block(block) => block.get("type").and_then(Value::as_str),
            ContentPart::Text(_) => None,
        }
    }
}

/// Message content: a plain string or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

impl MessageContent {
    /// Interpret an arbitrary JSON value as content.
    ///
    /// Strings and part lists map directly; anything else is rendered as
    /// compact JSON text.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => MessageContent::Text(text.clone()),
            Value::Array(_) => serde_json::from_value(value.clone())
                .unwrap_or_else(|_| MessageContent::Text(value.to_string())),
            other => MessageContent::Text(other.to_string()),
        }
    }

    /// Flattened text of this content. See [`flatten_content`].
    pub fn text(&self) -> String {
        flatten_content(self)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

/// Reduce content to plain text.
///
/// Strings are returned unchanged. Lists keep bare string parts and the
/// `text` field of `"text"` blocks, concatenated in order; every other block
/// is dropped.
pub fn flatten_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Block(block) if part.tag() == Some("text") => {
                    block.get("text").and_then(Value::as_str)
                }
                ContentPart::Block(_) => None,
            })
            .collect(),
    }
}

/// Remove `"tool_use"` blocks from list content, preserving the order of the
/// remaining parts. String content is returned unchanged.
pub fn remove_tool_calls(content: &MessageContent) -> MessageContent {
    match content {
        MessageContent::Text(_) => content.clone(),
        MessageContent::Parts(parts) => MessageContent::Parts(
            parts
                .iter()
                .filter(|part| part.tag() != Some("tool_use"))
                .cloned()
                .collect(),
        ),
    }
}

/// A message authored by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HumanMessage {
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A message (or streamed chunk of one) produced by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<JsonObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_chunks: Vec<JsonObject>,
    /// Provider side channel: `tool_calls`, `response_metadata`, `ai_call_id`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_kwargs: JsonObject,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub response_metadata: JsonObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AiMessage {
    /// Field names an AI message accepts when rebuilt from fragments.
    pub const FIELDS: &'static [&'static str] = &[
        "content",
        "tool_calls",
        "tool_call_chunks",
        "additional_kwargs",
        "response_metadata",
        "id",
        "name",
    ];

    pub fn text(content: impl Into<MessageContent>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Append a tool call in the engine's loose JSON shape.
    pub fn with_tool_call(
        mut self,
        name: impl Into<String>,
        args: Value,
        id: impl Into<String>,
    ) -> Self {
        let mut call = JsonObject::new();
        call.insert("name".to_string(), Value::String(name.into()));
        call.insert("args".to_string(), args);
        call.insert("id".to_string(), Value::String(id.into()));
        call.insert("type".to_string(), Value::String("tool_call".to_string()));
        self.tool_calls.push(call);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// The result of a tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolMessage {
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default)]
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolMessage {
    pub fn new(content: impl Into<MessageContent>, tool_call_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            ..Default::default()
        }
    }
}

/// A message with a free-form role. Only the `custom` role is surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleMessage {
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    #[serde(default)]
    pub content: MessageContent,
}

/// An engine message, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawMessage {
    Human(HumanMessage),
    Ai(AiMessage),
    AiChunk(AiMessage),
    Tool(ToolMessage),
    Chat(RoleMessage),
    System(SystemMessage),
}

impl RawMessage {
    pub fn human(content: impl Into<MessageContent>) -> Self {
        RawMessage::Human(HumanMessage {
            content: content.into(),
            id: None,
        })
    }

    pub fn ai(content: impl Into<MessageContent>) -> Self {
        RawMessage::Ai(AiMessage::text(content))
    }

    pub fn ai_chunk(content: impl Into<MessageContent>) -> Self {
        RawMessage::AiChunk(AiMessage::text(content))
    }

    pub fn tool(content: impl Into<MessageContent>, tool_call_id: impl Into<String>) -> Self {
        RawMessage::Tool(ToolMessage::new(content, tool_call_id))
    }

    /// A `custom`-role message carrying `data` as its only content part.
    pub fn custom(data: JsonObject) -> Self {
        RawMessage::Chat(RoleMessage {
            role: "custom".to_string(),
            content: MessageContent::Parts(vec![ContentPart::Block(data)]),
        })
    }

    /// The `type` tag this message serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            RawMessage::Human(_) => "human",
            RawMessage::Ai(_) => "ai",
            RawMessage::AiChunk(_) => "ai_chunk",
            RawMessage::Tool(_) => "tool",
            RawMessage::Chat(_) => "chat",
            RawMessage::System(_) => "system",
        }
    }

    pub fn content(&self) -> &MessageContent {
        match self {
            RawMessage::Human(m) => &m.content,
            RawMessage::Ai(m) | RawMessage::AiChunk(m) => &m.content,
            RawMessage::Tool(m) => &m.content,
            RawMessage::Chat(m) => &m.content,
            RawMessage::System(m) => &m.content,
        }
    }

    /// True for complete AI messages and AI chunks.
    pub fn is_ai(&self) -> bool {
        matches!(self, RawMessage::Ai(_) | RawMessage::AiChunk(_))
    }

    pub fn as_ai(&self) -> Option<&AiMessage> {
        match self {
            RawMessage::Ai(m) | RawMessage::AiChunk(m) => Some(m),
            _ => None,
        }
    }

    /// Tool calls of an AI message; empty for every other kind.
    pub fn tool_calls(&self) -> &[JsonObject] {
        self.as_ai().map(|m| m.tool_calls.as_slice()).unwrap_or(&[])
    }

    /// The correlated tool call id of a tool message, when non-empty.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            RawMessage::Tool(m) if !m.tool_call_id.is_empty() => Some(&m.tool_call_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
