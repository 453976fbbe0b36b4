//! `GET /v1/threads/:user_id`

use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::ServerResult;
use crate::state::AppState;

/// Threads owned by a user: those registered by this process together with
/// those found in the store, sorted.
pub async fn threads_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ServerResult<Json<Vec<String>>> {
    let mut threads: BTreeSet<String> = state.registry.threads_for(&user_id).into_iter().collect();
    threads.extend(state.store.threads_for_user(&user_id).await?);

    tracing::info!(%user_id, count = threads.len(), "listed threads");
    Ok(Json(threads.into_iter().collect()))
}
