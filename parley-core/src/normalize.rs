//! Conversion of engine messages into [`ChatMessage`]s.

use serde_json::Value;

use crate::chat::{ChatMessage, MessageType, ToolCall};
use crate::message::{flatten_content, AiMessage, ContentPart, JsonObject, MessageContent, RawMessage};

/// Role a [`RawMessage::Chat`] must carry to be surfaced as a custom message.
pub const CUSTOM_ROLE: &str = "custom";

/// Errors from [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// The message kind has no chat representation.
    #[error("Unsupported message kind: {0}")]
    UnsupportedMessageKind(String),

    /// A custom message whose first content part is not a JSON object.
    #[error("Malformed custom payload: {0}")]
    MalformedCustomPayload(String),
}

/// Convert one engine message into its chat representation.
///
/// Correlation identifiers (`run_id`, `thread_id`, `session_id`) are left
/// unset; the caller stamps them.
pub fn normalize(message: &RawMessage) -> Result<ChatMessage, NormalizeError> {
    match message {
        RawMessage::Human(human) => Ok(ChatMessage::new(
            MessageType::Human,
            flatten_content(&human.content),
        )),
        RawMessage::Ai(ai) | RawMessage::AiChunk(ai) => Ok(normalize_ai(ai)),
        RawMessage::Tool(tool) => {
            let mut chat = ChatMessage::new(MessageType::Tool, flatten_content(&tool.content));
            chat.tool_call_id = (!tool.tool_call_id.is_empty()).then(|| tool.tool_call_id.clone());
            Ok(chat)
        }
        RawMessage::Chat(chat) if chat.role == CUSTOM_ROLE => normalize_custom(&chat.content),
        RawMessage::Chat(chat) => Err(NormalizeError::UnsupportedMessageKind(format!(
            "chat message with role '{}'",
            chat.role
        ))),
        RawMessage::System(_) => Err(NormalizeError::UnsupportedMessageKind(
            "system".to_string(),
        )),
    }
}

fn normalize_ai(ai: &AiMessage) -> ChatMessage {
    let mut chat = ChatMessage::new(MessageType::Ai, flatten_content(&ai.content));
    chat.tool_calls = gather_tool_calls(ai);

    chat.response_metadata = ai.response_metadata.clone();
    if let Some(Value::Object(extra)) = ai.additional_kwargs.get("response_metadata") {
        chat.response_metadata
            .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    chat.ai_call_id = ai
        .additional_kwargs
        .get("ai_call_id")
        .and_then(Value::as_str)
        .map(str::to_owned);

    chat
}

fn normalize_custom(content: &MessageContent) -> Result<ChatMessage, NormalizeError> {
    let data = match content {
        MessageContent::Parts(parts) => match parts.first() {
            Some(ContentPart::Block(block)) => block.clone(),
            Some(ContentPart::Text(_)) => {
                return Err(NormalizeError::MalformedCustomPayload(
                    "first content part is a string".to_string(),
                ))
            }
            None => {
                return Err(NormalizeError::MalformedCustomPayload(
                    "content list is empty".to_string(),
                ))
            }
        },
        MessageContent::Text(_) => {
            return Err(NormalizeError::MalformedCustomPayload(
                "content is a string".to_string(),
            ))
        }
    };

    let mut chat = ChatMessage::new(MessageType::Custom, "");
    chat.custom_data = data;
    Ok(chat)
}

/// Gather the usable tool calls of an AI message.
///
/// Entries come from `tool_calls` first, then from
/// `additional_kwargs.tool_calls`. Entries without a `name` or an object
/// `args` are dropped.
pub fn gather_tool_calls(ai: &AiMessage) -> Vec<ToolCall> {
    let side_channel = match ai.additional_kwargs.get("tool_calls") {
        Some(Value::Array(entries)) => entries.as_slice(),
        _ => &[],
    };

    let primary = ai.tool_calls.iter().map(|entry| parse_tool_call(Some(entry)));
    let secondary = side_channel.iter().map(|entry| parse_tool_call(entry.as_object()));

    primary.chain(secondary).flatten().collect()
}

fn parse_tool_call(entry: Option<&JsonObject>) -> Option<ToolCall> {
    let Some(entry) = entry else {
        tracing::debug!("dropping tool call entry that is not an object");
        return None;
    };

    let name = match entry.get("name") {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Null) | None => {
            tracing::debug!(?entry, "dropping tool call without a name");
            return None;
        }
        Some(other) => other.to_string(),
    };

    let Some(Value::Object(args)) = entry.get("args") else {
        tracing::debug!(tool = %name, "dropping tool call without object args");
        return None;
    };

    let id = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_owned);

    Some(ToolCall::new(name, args.clone(), id))
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
