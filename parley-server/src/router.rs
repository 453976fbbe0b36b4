//! Router builder for parley HTTP endpoints.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use parley_core::{
    ConversationStore, ExecutionEngine, FormatterOptions, SessionCoordinator, ThreadRegistry,
};
use tower_http::trace::TraceLayer;

use crate::config::DEFAULT_SERVICE_NAME;
use crate::feedback::{FeedbackSink, TracingFeedbackSink};
use crate::routes::{
    feedback::feedback_handler, health::health_handler, history::history_handler,
    stream::stream_handler, threads::threads_handler,
};
use crate::state::AppState;

/// Builder for configuring parley HTTP endpoints.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use parley_core::ReactGraph;
/// use parley_server::ParleyRouter;
///
/// # async fn example(graph: ReactGraph) -> Result<(), Box<dyn std::error::Error>> {
/// let store = graph.store().clone();
/// let app = ParleyRouter::new(Arc::new(graph), store)
///     .service_name("Billing Agent")
///     .build();
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8081").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub struct ParleyRouter {
    engine: Arc<dyn ExecutionEngine>,
    store: Arc<dyn ConversationStore>,
    registry: Option<Arc<ThreadRegistry>>,
    feedback: Option<Arc<dyn FeedbackSink>>,
    formatter_options: FormatterOptions,
    service_name: String,
}

impl ParleyRouter {
    /// Create a router builder over an engine and the store it writes to.
    ///
    /// The store serves the history and thread listing endpoints.
    pub fn new(engine: Arc<dyn ExecutionEngine>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            engine,
            store,
            registry: None,
            feedback: None,
            formatter_options: FormatterOptions::default(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }

    /// Share an existing thread registry instead of creating one.
    pub fn registry(mut self, registry: Arc<ThreadRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Where `POST /v1/feedback` records scores.
    ///
    /// Defaults to [`TracingFeedbackSink`].
    pub fn feedback_sink(mut self, sink: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = Some(sink);
        self
    }

    /// Node-name conventions applied to every stream.
    pub fn formatter_options(mut self, options: FormatterOptions) -> Self {
        self.formatter_options = options;
        self
    }

    /// Name reported by `GET /health`.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Build the router with all endpoints.
    pub fn build(self) -> Router {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ThreadRegistry::new()));
        let coordinator = SessionCoordinator::new(self.engine, registry.clone())
            .with_formatter_options(self.formatter_options);

        let state = AppState {
            coordinator,
            store: self.store,
            registry,
            feedback: self
                .feedback
                .unwrap_or_else(|| Arc::new(TracingFeedbackSink)),
            service_name: Arc::from(self.service_name),
        };

        Router::new()
            .route("/v1/stream", post(stream_handler))
            .route("/v1/history/:thread_id", get(history_handler))
            .route("/v1/threads/:user_id", get(threads_handler))
            .route("/v1/feedback", post(feedback_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Build the router and nest it under a prefix path.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use parley_core::ReactGraph;
    /// # use parley_server::ParleyRouter;
    /// # use axum::Router;
    /// # fn example(graph: ReactGraph) {
    /// let store = graph.store().clone();
    /// // Stream endpoint at /agent/v1/stream
    /// let parley = ParleyRouter::new(Arc::new(graph), store).build_nested("/agent");
    ///
    /// let app = Router::new().merge(parley);
    /// # }
    /// ```
    pub fn build_nested(self, prefix: impl Into<String>) -> Router {
        Router::new().nest(&prefix.into(), self.build())
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
