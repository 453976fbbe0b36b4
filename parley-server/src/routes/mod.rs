//! HTTP handlers.

pub mod feedback;
pub mod health;
pub mod history;
pub mod stream;
pub mod threads;

use axum::http::HeaderMap;

/// Header carrying the caller's access token.
pub const TOKEN_HEADER: &str = "x-token";

/// Whether the request carries an access token.
///
/// The token is not validated; only its presence is logged.
pub(crate) fn has_token(headers: &HeaderMap) -> bool {
    headers.contains_key(TOKEN_HEADER)
}
