//! Error types for the parley server.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley_core::StoreError;

/// Errors that can occur in the parley server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Conversation storage failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::InvalidRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            ServerError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ServerError::Internal(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.clone()),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
