//! `POST /v1/feedback`

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::{ServerError, ServerResult};
use crate::feedback::FeedbackRequest;
use crate::state::AppState;

pub async fn feedback_handler(
    State(state): State<AppState>,
    request: Result<Json<FeedbackRequest>, JsonRejection>,
) -> ServerResult<Json<Value>> {
    let Json(feedback) = request?;
    state.feedback.record(&feedback).await.map_err(|e| {
        tracing::error!(run_id = %feedback.run_id, error = %e, "failed to record feedback");
        ServerError::Internal(e.to_string())
    })?;
    Ok(Json(json!({"status": "success"})))
}
