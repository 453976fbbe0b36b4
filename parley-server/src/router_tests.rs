//! Tests for the router builder and its endpoints.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use parley_core::engine::{EngineEvent, NodeUpdate};
use parley_core::message::RawMessage;
use parley_core::store::{Checkpoint, CheckpointMetadata, ConversationState};
use parley_core::test_utils::ScriptedEngine;
use parley_core::{ConversationStore, MemoryConversationStore, ThreadRegistry};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::router::ParleyRouter;

fn app(engine: ScriptedEngine, store: Arc<MemoryConversationStore>) -> Router {
    ParleyRouter::new(Arc::new(engine), store)
        .service_name("Test Agent")
        .build()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(body: Body) -> Value {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn save(store: &MemoryConversationStore, thread: &str, user: &str, messages: Vec<RawMessage>) {
    let state = ConversationState {
        messages,
        pending: Vec::new(),
        metadata: CheckpointMetadata {
            run_id: Some("run-1".to_string()),
            session_id: Some(thread.to_string()),
            user_id: Some(user.to_string()),
        },
    };
    store.put_checkpoint(Checkpoint::new(thread, state)).await.unwrap();
}

#[tokio::test]
async fn test_health() {
    let app = app(ScriptedEngine::new(), Arc::new(MemoryConversationStore::new()));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({"status": "healthy", "service": "Test Agent"})
    );
}

#[tokio::test]
async fn test_stream_headers_and_body() {
    let engine = ScriptedEngine::new().with_event(EngineEvent::update(NodeUpdate::messages(
        "agent",
        vec![RawMessage::ai("hi there")],
    )));
    let app = app(engine, Arc::new(MemoryConversationStore::new()));

    let response = app
        .oneshot(post_json("/v1/stream", json!({"message": "hello", "thread_id": "t1"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "[DONE]");

    let event: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(event["type"], "message");
    assert_eq!(event["content"]["type"], "ai");
    assert_eq!(event["content"]["content"], "hi there");
    assert_eq!(event["content"]["thread_id"], "t1");
}

#[tokio::test]
async fn test_stream_rejects_invalid_body() {
    let app = app(ScriptedEngine::new(), Arc::new(MemoryConversationStore::new()));

    let response = app
        .oneshot(post_json("/v1/stream", json!({"thread_id": "t1"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response.into_body()).await["code"], 400);
}

#[tokio::test]
async fn test_history_reads_latest_checkpoint() {
    let store = Arc::new(MemoryConversationStore::new());
    save(&store, "t1", "alice", vec![RawMessage::human("hi")]).await;
    save(&store, "t1", "alice", vec![RawMessage::human("hi"), RawMessage::ai("hello")]).await;
    let app = app(ScriptedEngine::new(), store);

    let response = app.oneshot(get("/v1/history/t1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["type"], "ai");
    assert_eq!(messages[1]["thread_id"], "t1");
}

#[tokio::test]
async fn test_history_of_unknown_thread_is_empty() {
    let app = app(ScriptedEngine::new(), Arc::new(MemoryConversationStore::new()));

    let response = app.oneshot(get("/v1/history/missing")).await.unwrap();
    assert_eq!(json_body(response.into_body()).await, json!({"messages": []}));
}

#[tokio::test]
async fn test_threads_unite_registry_and_store() {
    let store = Arc::new(MemoryConversationStore::new());
    save(&store, "t-stored", "alice", Vec::new()).await;
    save(&store, "t-other", "bob", Vec::new()).await;

    let registry = Arc::new(ThreadRegistry::new());
    registry.register("alice", "t-live");
    registry.register("alice", "t-stored");

    let app = ParleyRouter::new(Arc::new(ScriptedEngine::new()), store)
        .registry(registry)
        .build();

    let response = app.oneshot(get("/v1/threads/alice")).await.unwrap();
    assert_eq!(
        json_body(response.into_body()).await,
        json!(["t-live", "t-stored"])
    );
}

#[tokio::test]
async fn test_feedback_returns_success() {
    let app = app(ScriptedEngine::new(), Arc::new(MemoryConversationStore::new()));

    let response = app
        .oneshot(post_json(
            "/v1/feedback",
            json!({"run_id": "run-1", "key": "human-feedback-stars", "score": 0.8}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response.into_body()).await, json!({"status": "success"}));
}

#[tokio::test]
async fn test_build_nested_prefixes_routes() {
    let app = ParleyRouter::new(
        Arc::new(ScriptedEngine::new()),
        Arc::new(MemoryConversationStore::new()),
    )
    .build_nested("/agent");

    let nested = app.clone().oneshot(get("/agent/health")).await.unwrap();
    assert_eq!(nested.status(), StatusCode::OK);

    let bare = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(bare.status(), StatusCode::NOT_FOUND);
}
