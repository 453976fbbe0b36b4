//! Tracking of the tool call currently in flight.
//!
//! Streaming chunks rarely carry the identifier of the tool call they belong
//! to. The tracker remembers the most recent identifier seen on the stream so
//! token events can be attributed to it.

use serde_json::Value;

use crate::engine::{EngineEvent, NodeUpdate};
use crate::message::{JsonObject, RawMessage};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum TrackError {
    #[error("tool call id is not a string: {0}")]
    NonStringId(String),
}

/// "Tool call currently in flight" state for one stream.
#[derive(Debug, Clone, Default)]
pub struct ToolCallTracker {
    current: Option<String>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The identifier of the tool call in flight, if any.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Update the current id from one engine event. Never fails.
    pub fn observe(&mut self, event: &EngineEvent) {
        let result = match event {
            EngineEvent::Updates(updates) => self.observe_updates(updates),
            EngineEvent::Tokens(token) => self.observe_chunk(&token.chunk),
            EngineEvent::Custom(_) => Ok(()),
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "tool call tracking skipped");
        }
    }

    fn observe_updates(&mut self, updates: &[NodeUpdate]) -> Result<(), TrackError> {
        let relevant = updates
            .iter()
            .flat_map(NodeUpdate::complete_messages)
            .find(|message| !message.tool_calls().is_empty() || message.tool_call_id().is_some());

        match relevant {
            Some(message) => self.observe_message(message),
            None => Ok(()),
        }
    }

    fn observe_chunk(&mut self, chunk: &RawMessage) -> Result<(), TrackError> {
        if chunk.tool_calls().is_empty() && chunk.tool_call_id().is_none() {
            return Ok(());
        }
        self.observe_message(chunk)
    }

    fn observe_message(&mut self, message: &RawMessage) -> Result<(), TrackError> {
        let id = match message.tool_calls().first() {
            Some(call) => call_id(call)?,
            None => message.tool_call_id().map(str::to_owned),
        };

        if let Some(id) = id {
            if self.current.as_deref() != Some(id.as_str()) {
                tracing::debug!(tool_call_id = %id, "tool call in flight");
            }
            self.current = Some(id);
        }
        Ok(())
    }
}

/// The identifier a token chunk carries for itself, from its tool calls,
/// tool call chunks or tool call id, in that order.
pub fn chunk_tool_call_id(chunk: &RawMessage) -> Option<String> {
    let lookup = || -> Result<Option<String>, TrackError> {
        if let Some(call) = chunk.tool_calls().first() {
            return call_id(call);
        }
        if let Some(call) = chunk.as_ai().and_then(|ai| ai.tool_call_chunks.first()) {
            return call_id(call);
        }
        Ok(chunk.tool_call_id().map(str::to_owned))
    };

    lookup().unwrap_or_else(|e| {
        tracing::debug!(error = %e, "chunk tool call id unreadable");
        None
    })
}

fn call_id(call: &JsonObject) -> Result<Option<String>, TrackError> {
    match call.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if id.is_empty() => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(other) => Err(TrackError::NonStringId(other.to_string())),
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
