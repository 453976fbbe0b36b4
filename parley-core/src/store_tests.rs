use super::*;
use crate::engine::Interrupt;
use serde_json::json;

fn state(messages: Vec<RawMessage>, user: &str) -> ConversationState {
    ConversationState {
        messages,
        pending: Vec::new(),
        metadata: CheckpointMetadata {
            run_id: Some("run".to_string()),
            session_id: None,
            user_id: Some(user.to_string()),
        },
    }
}

#[tokio::test]
async fn test_missing_thread_has_no_state() {
    let store = MemoryConversationStore::new();
    assert_eq!(store.get_state("nope").await.unwrap(), None);
    assert!(store.list_checkpoints("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_latest_checkpoint_is_current_state() {
    let store = MemoryConversationStore::new();
    store
        .put_checkpoint(Checkpoint::new("t1", state(vec![RawMessage::human("a")], "u1")))
        .await
        .unwrap();
    store
        .put_checkpoint(Checkpoint::new(
            "t1",
            state(vec![RawMessage::human("a"), RawMessage::ai("b")], "u1"),
        ))
        .await
        .unwrap();

    let current = store.get_state("t1").await.unwrap().unwrap();
    assert_eq!(current.messages.len(), 2);

    let all = store.list_checkpoints("t1").await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].state.messages.len(), 1);
    assert_eq!(store.checkpoint_count("t1"), 2);
}

#[tokio::test]
async fn test_delete_thread() {
    let store = MemoryConversationStore::new();
    store
        .put_checkpoint(Checkpoint::new("t1", state(Vec::new(), "u1")))
        .await
        .unwrap();

    assert!(store.delete_thread("t1").await.unwrap());
    assert!(!store.delete_thread("t1").await.unwrap());
    assert_eq!(store.get_state("t1").await.unwrap(), None);
}

#[tokio::test]
async fn test_threads_for_user_sorted_and_filtered() {
    let store = MemoryConversationStore::new();
    for (thread, user) in [("t-b", "alice"), ("t-a", "alice"), ("t-c", "bob")] {
        store
            .put_checkpoint(Checkpoint::new(thread, state(Vec::new(), user)))
            .await
            .unwrap();
    }

    assert_eq!(
        store.threads_for_user("alice").await.unwrap(),
        vec!["t-a".to_string(), "t-b".to_string()]
    );
    assert!(store.threads_for_user("carol").await.unwrap().is_empty());
}

#[test]
fn test_state_interrupt_detection_and_snapshot() {
    let mut s = state(vec![RawMessage::human("pay")], "u1");
    assert!(!s.is_interrupted());

    s.pending.push(PendingTask {
        id: "task".to_string(),
        name: "tools".to_string(),
        interrupts: vec![Interrupt::new(json!("confirm?"))],
        tool_calls: Vec::new(),
    });
    assert!(s.is_interrupted());

    let snapshot = s.into_snapshot();
    assert!(snapshot.is_interrupted());
    assert_eq!(snapshot.messages.len(), 1);
}

#[test]
fn test_checkpoint_serializes_state() {
    let checkpoint = Checkpoint::new("t1", state(vec![RawMessage::ai("x")], "u1"));
    let json = serde_json::to_string(&checkpoint).unwrap();
    let parsed: Checkpoint = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, checkpoint);
}
