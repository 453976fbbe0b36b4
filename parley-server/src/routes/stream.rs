//! `POST /v1/stream`

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use parley_core::StreamRequest;
use tokio_stream::StreamExt;

use super::has_token;
use crate::error::ServerResult;
use crate::state::AppState;

/// Media type of the streaming response.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Stream one turn as newline-terminated JSON events ending with `[DONE]`.
pub async fn stream_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Result<Json<StreamRequest>, JsonRejection>,
) -> ServerResult<Response> {
    let Json(request) = request?;
    tracing::info!(
        thread_id = request.thread_id.as_deref().unwrap_or("<new>"),
        token_present = has_token(&headers),
        "stream request"
    );

    let lines = state
        .coordinator
        .stream(request)
        .map(|item| Ok::<_, Infallible>(item.to_line()));

    let mut response = Body::from_stream(lines).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}
