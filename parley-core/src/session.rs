//! Per-request stream coordination.
//!
//! [`SessionCoordinator`] resolves a request's identity, decides whether the
//! turn resumes an interrupted task, drives the engine through an
//! [`EventFormatter`] and always terminates the outbound stream with
//! [`StreamItem::Done`].

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::chat::MessageType;
use crate::engine::{EngineInput, EngineStream, ExecutionEngine, RunConfig};
use crate::error::{Error, Result};
use crate::events::{OutputEvent, StreamItem};
use crate::formatter::{EventFormatter, FormatterOptions};
use crate::registry::ThreadRegistry;

/// User identity applied when a request carries none.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Inbound streaming request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_true")]
    pub stream_tokens: bool,
}

fn default_true() -> bool {
    true
}

impl StreamRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            thread_id: None,
            session_id: None,
            user_id: None,
            stream_tokens: true,
        }
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn stream_tokens(mut self, stream_tokens: bool) -> Self {
        self.stream_tokens = stream_tokens;
        self
    }
}

/// Lifecycle of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Init,
    ResolvingIdentity,
    Resuming,
    FreshTurn,
    Streaming,
    Completed,
    Failed,
}

fn enter_phase(phase: StreamPhase) {
    tracing::debug!(?phase, "stream phase");
}

/// Drives engine runs for inbound requests.
#[derive(Clone)]
pub struct SessionCoordinator {
    engine: Arc<dyn ExecutionEngine>,
    registry: Arc<ThreadRegistry>,
    options: FormatterOptions,
}

impl SessionCoordinator {
    pub fn new(engine: Arc<dyn ExecutionEngine>, registry: Arc<ThreadRegistry>) -> Self {
        Self {
            engine,
            registry,
            options: FormatterOptions::default(),
        }
    }

    /// Override the formatter's node-name conventions.
    ///
    /// `stream_tokens` is always taken from the request.
    pub fn with_formatter_options(mut self, options: FormatterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    /// Resolve identifiers for a request and register the thread.
    pub fn resolve(&self, request: &StreamRequest) -> RunConfig {
        let config = identity(request);
        self.register(&config);
        config
    }

    fn register(&self, config: &RunConfig) {
        enter_phase(StreamPhase::ResolvingIdentity);
        if self.registry.register(&config.user_id, &config.thread_id) {
            tracing::debug!(user_id = %config.user_id, thread_id = %config.thread_id, "registered thread");
        }
    }

    /// Run one turn and return the outbound stream.
    ///
    /// The stream always ends with exactly one [`StreamItem::Done`].
    pub fn stream(&self, request: StreamRequest) -> BoxStream<'static, StreamItem> {
        let config = identity(&request);
        let span = tracing::info_span!(
            "stream",
            run_id = %config.run_id,
            thread_id = %config.thread_id,
            session_id = %config.session_id,
            user_id = %config.user_id,
        );
        span.in_scope(|| {
            enter_phase(StreamPhase::Init);
            self.register(&config);
        });

        let engine = self.engine.clone();
        let options = self.options.clone().with_stream_tokens(request.stream_tokens);
        let message = request.message;

        let events = async_stream::stream! {
            let mut formatter = EventFormatter::new(&config, options);
            span.in_scope(|| tracing::info!("stream started"));

            let opened = open_run(engine.as_ref(), &message, config.clone())
                .instrument(span.clone())
                .await;

            match opened {
                Ok(mut upstream) => {
                    span.in_scope(|| enter_phase(StreamPhase::Streaming));
                    let mut failed = false;

                    while let Some(next) = upstream.next().instrument(span.clone()).await {
                        match next {
                            Ok(event) => {
                                let outputs = span.in_scope(|| formatter.format(&event));
                                for output in outputs {
                                    if is_echo(&output, &message) {
                                        continue;
                                    }
                                    yield output;
                                }
                            }
                            Err(e) => {
                                let err = Error::from(e);
                                span.in_scope(|| {
                                    tracing::error!(error = %err, "engine failed mid-stream");
                                    enter_phase(StreamPhase::Failed);
                                });
                                failed = true;
                                yield OutputEvent::from_error(&err);
                                break;
                            }
                        }
                    }

                    if !failed {
                        span.in_scope(|| {
                            enter_phase(StreamPhase::Completed);
                            tracing::info!("stream completed");
                        });
                    }
                }
                Err(err) => {
                    span.in_scope(|| {
                        tracing::error!(error = %err, "engine failed to start");
                        enter_phase(StreamPhase::Failed);
                    });
                    yield OutputEvent::from_error(&err);
                }
            }
        };

        events
            .map(StreamItem::Event)
            .chain(stream::once(async { StreamItem::Done }))
            .boxed()
    }
}

/// Query state, pick fresh or resume input, and start the engine.
async fn open_run(
    engine: &dyn ExecutionEngine,
    message: &str,
    config: RunConfig,
) -> Result<EngineStream> {
    let snapshot = engine.get_state(&config).await?;

    let input = if snapshot.is_interrupted() {
        enter_phase(StreamPhase::Resuming);
        EngineInput::Resume(message.to_string())
    } else {
        enter_phase(StreamPhase::FreshTurn);
        EngineInput::human_turn(message)
    };

    Ok(engine.stream(input, config).await?)
}

/// Identifiers for a request: supplied values, or fresh ones where absent.
///
/// This is the only place a thread identity is minted.
fn identity(request: &StreamRequest) -> RunConfig {
    let thread_id = request
        .thread_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session_id = request
        .session_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| thread_id.clone());
    let user_id = request
        .user_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string());

    RunConfig::new(thread_id, session_id, user_id)
}

/// True for the engine's echo of the request's own message.
fn is_echo(event: &OutputEvent, message: &str) -> bool {
    matches!(
        event,
        OutputEvent::Message { content }
            if content.message_type == MessageType::Human && content.content == message
    )
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
