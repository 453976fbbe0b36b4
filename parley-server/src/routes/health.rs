//! `GET /health`

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"status": "healthy", "service": state.service_name.as_ref()}))
}
