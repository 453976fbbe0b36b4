//! `GET /v1/history/:thread_id`

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use parley_core::store::Checkpoint;
use parley_core::{normalize, ChatMessage};
use serde::{Deserialize, Serialize};

use super::has_token;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
}

/// Conversation history of a thread.
///
/// Built from the latest checkpoint. If that yields nothing, every
/// checkpoint is replayed oldest first, keeping the first message of each
/// `(type, content)` pair. Store failures yield an empty history.
pub async fn history_handler(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> Json<HistoryResponse> {
    tracing::info!(%thread_id, token_present = has_token(&headers), "history request");

    let checkpoints = match state.store.list_checkpoints(&thread_id).await {
        Ok(checkpoints) => checkpoints,
        Err(e) => {
            tracing::error!(%thread_id, error = %e, "failed to read history");
            return Json(HistoryResponse {
                messages: Vec::new(),
            });
        }
    };

    let messages = collect_history(&thread_id, &checkpoints);
    tracing::info!(
        %thread_id,
        checkpoints = checkpoints.len(),
        messages = messages.len(),
        "history loaded"
    );
    Json(HistoryResponse { messages })
}

pub(crate) fn collect_history(thread_id: &str, checkpoints: &[Checkpoint]) -> Vec<ChatMessage> {
    let Some(latest) = checkpoints.last() else {
        return Vec::new();
    };

    let messages = convert(thread_id, latest);
    if !messages.is_empty() {
        return messages;
    }

    let mut unique: Vec<ChatMessage> = Vec::new();
    for message in checkpoints.iter().flat_map(|c| convert(thread_id, c)) {
        let duplicate = unique
            .iter()
            .any(|seen| seen.message_type == message.message_type && seen.content == message.content);
        if duplicate {
            tracing::debug!(%thread_id, kind = message.message_type.as_str(), "skipped duplicate message");
        } else {
            unique.push(message);
        }
    }
    unique
}

/// Convert one checkpoint's messages, stamping the checkpoint's identifiers.
fn convert(thread_id: &str, checkpoint: &Checkpoint) -> Vec<ChatMessage> {
    let metadata = &checkpoint.state.metadata;
    checkpoint
        .state
        .messages
        .iter()
        .filter_map(|raw| match normalize(raw) {
            Ok(mut message) => {
                message.thread_id = Some(thread_id.to_string());
                message.run_id = metadata.run_id.clone();
                message.session_id = metadata.session_id.clone();
                Some(message)
            }
            Err(e) => {
                tracing::warn!(%thread_id, kind = raw.kind(), error = %e, "could not convert message");
                None
            }
        })
        .collect()
}
