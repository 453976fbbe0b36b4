//! Top-level error type for parley
//!
//! Flattens the per-module errors into the categories callers act on:
//! formatting problems are reported to the client and the stream goes on,
//! everything else ends the run.

use thiserror::Error;

use crate::engine::EngineError;
use crate::formatter::FormatError;
use crate::graph::GraphBuildError;
use crate::normalize::NormalizeError;
use crate::store::StoreError;
use crate::tool::ToolError;

/// Top-level error type for parley operations
#[derive(Debug, Error)]
pub enum Error {
    /// A single message could not be formatted (recoverable)
    #[error("formatting error: {0}")]
    Format(String),

    /// The chat model failed
    #[error("model error: {0}")]
    Model(String),

    /// Tool execution failed
    #[error("tool error: {0}")]
    Tool(String),

    /// Conversation storage failed
    #[error("store error: {0}")]
    Store(String),

    /// Resume requested without an interrupted task
    #[error("nothing to resume: {0}")]
    NothingToResume(String),

    /// Configuration error (missing model or store, duplicate tool)
    #[error("configuration error: {0}")]
    Config(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if the stream can continue past this error.
    ///
    /// Decides which `error` event a client sees; see
    /// [`OutputEvent::from_error`](crate::events::OutputEvent::from_error).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Format(_))
    }
}

impl From<NormalizeError> for Error {
    fn from(err: NormalizeError) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<ToolError> for Error {
    fn from(err: ToolError) -> Self {
        Self::Tool(err.to_string())
    }
}

impl From<GraphBuildError> for Error {
    fn from(err: GraphBuildError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Model(msg) => Self::Model(msg),
            EngineError::Tool(msg) => Self::Tool(msg),
            EngineError::Store(e) => e.into(),
            EngineError::NothingToResume(thread) => Self::NothingToResume(thread),
            EngineError::RecursionLimit(steps) => {
                Self::Model(format!("recursion limit of {} steps reached", steps))
            }
            EngineError::Other(msg) => Self::Other(msg),
        }
    }
}

/// Result type for parley operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_formatting_errors_are_recoverable() {
        let err: Error = NormalizeError::UnsupportedMessageKind("system".into()).into();
        assert!(err.is_recoverable());

        let err: Error = FormatError::CustomPayload("not a message".into()).into();
        assert!(err.is_recoverable());

        let err: Error = EngineError::Model("overloaded".into()).into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_from_engine_error() {
        let err: Error = EngineError::Store(StoreError::Storage("disk full".into())).into();
        assert!(matches!(err, Error::Store(msg) if msg.contains("disk full")));

        let err: Error = EngineError::RecursionLimit(25).into();
        assert!(matches!(err, Error::Model(msg) if msg.contains("25")));

        let err: Error = EngineError::NothingToResume("t1".into()).into();
        assert_eq!(err.to_string(), "nothing to resume: t1");
    }

    #[test]
    fn test_from_build_error() {
        let err: Error = GraphBuildError::NoModel.into();
        assert!(matches!(err, Error::Config(_)));
    }
}
