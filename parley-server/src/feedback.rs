//! User feedback on agent runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A score recorded against one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub run_id: String,
    pub key: String,
    pub score: f64,
    /// Extra fields forwarded to the sink unchanged.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
#[error("Feedback sink error: {0}")]
pub struct FeedbackError(pub String);

/// Where feedback goes.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn record(&self, feedback: &FeedbackRequest) -> Result<(), FeedbackError>;
}

/// Records feedback as structured log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFeedbackSink;

#[async_trait]
impl FeedbackSink for TracingFeedbackSink {
    async fn record(&self, feedback: &FeedbackRequest) -> Result<(), FeedbackError> {
        tracing::info!(
            target: "parley::feedback",
            run_id = %feedback.run_id,
            key = %feedback.key,
            score = feedback.score,
            kwargs = %serde_json::Value::Object(feedback.kwargs.clone()),
            "feedback recorded"
        );
        Ok(())
    }
}
