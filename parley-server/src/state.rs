//! Application state for the parley server.

use std::sync::Arc;

use parley_core::{ConversationStore, SessionCoordinator, ThreadRegistry};

use crate::feedback::FeedbackSink;

/// Shared application state.
///
/// Cloned for each request handler; every field is shared.
#[derive(Clone)]
pub struct AppState {
    /// Drives one engine run per stream request.
    pub coordinator: SessionCoordinator,
    /// Persisted threads, read by the history and threads endpoints.
    pub store: Arc<dyn ConversationStore>,
    /// Threads registered by this process.
    pub registry: Arc<ThreadRegistry>,
    pub feedback: Arc<dyn FeedbackSink>,
    /// Name reported by the health check.
    pub service_name: Arc<str>,
}
