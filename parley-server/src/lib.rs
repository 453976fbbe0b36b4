//! Streaming HTTP server for parley conversational agents.
//!
//! Exposes a [`parley_core::SessionCoordinator`] over HTTP: one streaming
//! endpoint that emits newline-delimited JSON events ending with `[DONE]`,
//! plus history, thread listing, feedback and health endpoints.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley_core::{MemoryConversationStore, ReactGraph};
//! use parley_server::ParleyRouter;
//!
//! # async fn example(model: impl parley_core::ChatModel + 'static) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryConversationStore::new());
//! let graph = ReactGraph::builder().model(model).store(store.clone()).build()?;
//!
//! let app = ParleyRouter::new(Arc::new(graph), store).build();
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8081").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod feedback;
pub mod router;
pub mod routes;
pub(crate) mod state;

// Re-exports
pub use config::{ConfigError, Settings, StoreKind};
pub use error::{ServerError, ServerResult};
pub use feedback::{FeedbackError, FeedbackRequest, FeedbackSink, TracingFeedbackSink};
pub use router::ParleyRouter;
