//! Rebuilding AI messages from `(key, value)` fragments.
//!
//! Some engines report a node's new message as a run of loose field pairs
//! instead of a typed message. [`FragmentAccumulator`] collects consecutive
//! pairs and turns each run into one AI message.

use serde_json::Value;

use crate::engine::UpdateItem;
use crate::message::{AiMessage, JsonObject, RawMessage};

/// A fragment run that could not be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error("could not rebuild AI message from fragments: {0}")]
    Build(String),
}

/// Accumulates field fragments until a flush point.
#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    fields: JsonObject,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build an AI message from the accumulated fields and clear them.
    ///
    /// Returns `None` when nothing was accumulated.
    pub fn flush(&mut self) -> Option<Result<RawMessage, FragmentError>> {
        if self.fields.is_empty() {
            return None;
        }

        let fields = std::mem::take(&mut self.fields);
        let mut accepted = JsonObject::new();
        for (key, value) in fields {
            if AiMessage::FIELDS.contains(&key.as_str()) {
                accepted.insert(key, value);
            } else {
                tracing::debug!(field = %key, "dropping unknown message fragment field");
            }
        }

        Some(
            serde_json::from_value::<AiMessage>(Value::Object(accepted))
                .map(RawMessage::Ai)
                .map_err(|e| FragmentError::Build(e.to_string())),
        )
    }
}

/// Turn a node's update items into messages, in order.
///
/// Each run of consecutive fragments becomes one AI message placed where the
/// run started.
pub fn reassemble(items: Vec<UpdateItem>) -> Vec<Result<RawMessage, FragmentError>> {
    let mut accumulator = FragmentAccumulator::new();
    let mut messages = Vec::with_capacity(items.len());

    for item in items {
        match item {
            UpdateItem::Fragment(key, value) => accumulator.push(key, value),
            UpdateItem::Message(message) => {
                messages.extend(accumulator.flush());
                messages.push(Ok(message));
            }
        }
    }
    messages.extend(accumulator.flush());

    messages
}
