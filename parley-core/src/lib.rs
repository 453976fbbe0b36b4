//! # Parley
//!
//! Event normalization and session continuity for streaming conversational
//! agents.
//!
//! An execution engine reports a turn as node updates, token chunks and
//! custom payloads. Parley turns those into one ordered stream of client
//! events (`message`, `token`, `error`) that always ends with `[DONE]`, and
//! keeps each conversation's identity across requests so an interrupted run
//! can be resumed by the next message.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use parley_core::{
//!     MemoryConversationStore, ReactGraph, SessionCoordinator, StreamRequest, ThreadRegistry,
//! };
//!
//! # async fn example(model: impl parley_core::ChatModel + 'static) -> parley_core::Result<()> {
//! let graph = ReactGraph::builder()
//!     .model(model)
//!     .store(Arc::new(MemoryConversationStore::new()))
//!     .system_prompt("You are a helpful assistant.")
//!     .build()?;
//!
//! let coordinator = SessionCoordinator::new(Arc::new(graph), Arc::new(ThreadRegistry::new()));
//! let mut stream = coordinator.stream(StreamRequest::new("What is 2 + 2?"));
//! while let Some(item) = stream.next().await {
//!     print!("{}", item.to_line());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`message`] and [`chat`]: engine-side and client-side message shapes
//! - [`normalize`], [`reassembly`], [`tracker`], [`formatter`]: the event
//!   pipeline
//! - [`session`]: per-request identity resolution and stream coordination
//! - [`store`], [`registry`]: persisted threads and the user to thread index
//! - [`graph`], [`provider`], [`tool`]: a reference ReAct engine
//!
//! ## Feature Flags
//!
//! - `openai` - OpenAI-compatible streaming chat model
//! - `test-utils` - scripted engine, mock model and sample tools

pub mod chat;
pub mod engine;
pub mod error;
pub mod events;
pub mod formatter;
pub mod graph;
pub mod message;
pub mod normalize;
pub mod provider;
pub mod reassembly;
pub mod registry;
pub mod session;
pub mod store;
pub mod tool;
pub mod tracker;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chat::{ChatMessage, MessageType, ToolCall};
pub use engine::{
    EngineError, EngineEvent, EngineInput, EngineSnapshot, EngineStream, ExecutionEngine,
    Interrupt, NodeUpdate, PendingTask, RunConfig, TokenEvent, TokenMetadata, UpdateItem,
    UpdatePayload,
};
pub use error::{Error, Result};
pub use events::{ErrorPayload, OutputEvent, StreamItem, DONE_SENTINEL};
pub use formatter::{EventFormatter, FormatError, FormatterOptions};
pub use graph::{GraphBuildError, ReactGraph, ReactGraphBuilder};
pub use message::{AiMessage, ContentPart, MessageContent, RawMessage};
pub use normalize::{normalize, NormalizeError};
pub use provider::{ChatModel, ModelRequest, ToolSpec};
pub use registry::ThreadRegistry;
pub use session::{SessionCoordinator, StreamRequest, ANONYMOUS_USER};
pub use store::{
    Checkpoint, CheckpointMetadata, ConversationState, ConversationStore,
    MemoryConversationStore, StoreError,
};
pub use tool::{box_tool, DynTool, Tool, ToolError, ToolOutput};

#[cfg(feature = "openai")]
pub use provider::OpenAiChatModel;
