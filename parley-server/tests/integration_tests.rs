//! Integration tests for parley-server.
//!
//! These drive the full request → coordinator → engine → events → body flow
//! with a mock chat model.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use parley_core::test_utils::{ApprovalTool, MockChatModel};
use parley_core::{MemoryConversationStore, ReactGraph};
use parley_server::{FeedbackError, FeedbackRequest, FeedbackSink, ParleyRouter};
use serde_json::{json, Value};
use tower::ServiceExt;

#[derive(Default)]
struct RecordingSink {
    recorded: Mutex<Vec<FeedbackRequest>>,
}

#[async_trait]
impl FeedbackSink for RecordingSink {
    async fn record(&self, feedback: &FeedbackRequest) -> Result<(), FeedbackError> {
        self.recorded.lock().push(feedback.clone());
        Ok(())
    }
}

/// Helper to build the app around a mock model.
fn build_app(model: MockChatModel) -> Router {
    let store = Arc::new(MemoryConversationStore::new());
    let graph = ReactGraph::builder()
        .model(model)
        .add_tool(ApprovalTool)
        .store(store.clone())
        .build()
        .expect("Failed to build graph");
    ParleyRouter::new(Arc::new(graph), store).build()
}

fn stream_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/stream")
        .header("Content-Type", "application/json")
        .header("X-Token", "opaque")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Split a response body into its JSON events, checking the terminal line.
async fn collect_events(body: Body) -> Vec<Value> {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.ends_with("[DONE]\n"), "missing terminal line: {text}");

    let mut lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.pop(), Some("[DONE]"));
    lines
        .into_iter()
        .map(|line| serde_json::from_str(line).expect("event line is JSON"))
        .collect()
}

fn event_types(events: &[Value]) -> Vec<&str> {
    events.iter().filter_map(|e| e["type"].as_str()).collect()
}

#[tokio::test]
async fn test_new_conversation_gets_thread_and_matching_tokens() {
    let app = build_app(MockChatModel::new().with_text("Paris is the capital of France."));

    let response = app
        .oneshot(stream_request(json!({"message": "Capital of France?"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = collect_events(response.into_body()).await;
    let tokens: String = events
        .iter()
        .filter(|e| e["type"] == "token")
        .filter_map(|e| e["content"].as_str())
        .collect();

    let message = events.iter().find(|e| e["type"] == "message").unwrap();
    assert_eq!(message["content"]["content"], "Paris is the capital of France.");
    assert_eq!(tokens, "Paris is the capital of France.");

    let thread_id = message["content"]["thread_id"].as_str().unwrap();
    assert!(!thread_id.is_empty());
    assert_eq!(message["content"]["session_id"], thread_id);
}

#[tokio::test]
async fn test_stream_tokens_off_sends_messages_only() {
    let app = build_app(MockChatModel::new().with_text("Just the message."));

    let response = app
        .oneshot(stream_request(
            json!({"message": "hi", "stream_tokens": false}),
        ))
        .await
        .unwrap();

    let events = collect_events(response.into_body()).await;
    assert_eq!(event_types(&events), vec!["message"]);
}

#[tokio::test]
async fn test_interrupt_then_resume_over_http() {
    let app = build_app(
        MockChatModel::new()
            .with_tool_call_id("approve", json!({"action": "deploy"}), "call_deploy")
            .with_text("Deployed."),
    );

    let first = app
        .clone()
        .oneshot(stream_request(
            json!({"message": "deploy it", "thread_id": "t-deploy", "user_id": "ops"}),
        ))
        .await
        .unwrap();
    let events = collect_events(first.into_body()).await;
    assert!(events
        .iter()
        .any(|e| e["type"] == "message" && e["content"]["content"] == "Approve deploy?"));

    let second = app
        .clone()
        .oneshot(stream_request(
            json!({"message": "yes", "thread_id": "t-deploy", "user_id": "ops"}),
        ))
        .await
        .unwrap();
    let events = collect_events(second.into_body()).await;
    let messages: Vec<&Value> = events.iter().filter(|e| e["type"] == "message").collect();
    assert_eq!(messages[0]["content"]["type"], "tool");
    assert_eq!(messages[0]["content"]["content"], "deploy: yes");
    assert_eq!(messages[0]["content"]["tool_call_id"], "call_deploy");
    assert_eq!(messages[1]["content"]["content"], "Deployed.");

    let history = app
        .clone()
        .oneshot(Request::builder().uri("/v1/history/t-deploy").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(history.into_body(), usize::MAX).await.unwrap();
    let history: Value = serde_json::from_slice(&bytes).unwrap();
    let types: Vec<&str> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["type"].as_str())
        .collect();
    assert_eq!(types, vec!["human", "ai", "tool", "ai"]);

    let threads = app
        .oneshot(Request::builder().uri("/v1/threads/ops").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(threads.into_body(), usize::MAX).await.unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!(["t-deploy"]));
}

#[tokio::test]
async fn test_model_failure_is_reported_in_band() {
    let app = build_app(MockChatModel::new());

    let response = app
        .oneshot(stream_request(json!({"message": "hello"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = collect_events(response.into_body()).await;
    assert_eq!(
        events,
        vec![json!({
            "type": "error",
            "content": {
                "message": "Internal server error",
                "recoverable": false,
                "error_type": "agent_error"
            }
        })]
    );
}

#[tokio::test]
async fn test_feedback_reaches_sink() {
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(MemoryConversationStore::new());
    let graph = ReactGraph::builder()
        .model(MockChatModel::new())
        .store(store.clone())
        .build()
        .unwrap();
    let app = ParleyRouter::new(Arc::new(graph), store)
        .feedback_sink(sink.clone())
        .build();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/feedback")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "run_id": "run-42",
                        "key": "human-feedback-stars",
                        "score": 0.8,
                        "kwargs": {"comment": "In-line human feedback"}
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let recorded = sink.recorded.lock();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].run_id, "run-42");
    assert_eq!(recorded[0].score, 0.8);
    assert_eq!(recorded[0].kwargs["comment"], "In-line human feedback");
}
