//! Conversation state storage.
//!
//! A store keeps the checkpoints of every thread. The latest checkpoint of a
//! thread is its current [`ConversationState`]; older checkpoints are kept so
//! history can be reconstructed.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineSnapshot, PendingTask, RunConfig};
use crate::message::RawMessage;

/// Errors that can occur in store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// State could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Who produced a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl From<&RunConfig> for CheckpointMetadata {
    fn from(config: &RunConfig) -> Self {
        Self {
            run_id: Some(config.run_id.clone()),
            session_id: Some(config.session_id.clone()),
            user_id: Some(config.user_id.clone()),
        }
    }
}

/// State of one thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Ordered message history.
    #[serde(default)]
    pub messages: Vec<RawMessage>,
    /// Tasks paused on interrupts.
    #[serde(default)]
    pub pending: Vec<PendingTask>,
    #[serde(default)]
    pub metadata: CheckpointMetadata,
}

impl ConversationState {
    pub fn is_interrupted(&self) -> bool {
        self.pending.iter().any(PendingTask::is_interrupted)
    }

    pub fn into_snapshot(self) -> EngineSnapshot {
        EngineSnapshot {
            messages: self.messages,
            tasks: self.pending,
        }
    }
}

/// One persisted snapshot of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    pub created_at: DateTime<Utc>,
    pub state: ConversationState,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, state: ConversationState) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            created_at: Utc::now(),
            state,
        }
    }
}

/// Storage for thread checkpoints.
///
/// Writes are atomic per checkpoint: a concurrent reader sees either the
/// previous or the new state of a thread.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Latest state of a thread, `None` if it has no checkpoint.
    async fn get_state(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError>;

    /// All checkpoints of a thread, oldest first.
    async fn list_checkpoints(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StoreError>;

    /// Append a checkpoint; it becomes the thread's current state.
    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), StoreError>;

    /// Remove a thread and all its checkpoints.
    ///
    /// Returns `true` if the thread existed.
    async fn delete_thread(&self, thread_id: &str) -> Result<bool, StoreError>;

    /// Threads with at least one checkpoint written by `user_id`, sorted.
    async fn threads_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory conversation store.
///
/// State is lost when the process exits.
#[derive(Default)]
pub struct MemoryConversationStore {
    checkpoints: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints stored for a thread.
    pub fn checkpoint_count(&self, thread_id: &str) -> usize {
        self.checkpoints
            .read()
            .get(thread_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get_state(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self
            .checkpoints
            .read()
            .get(thread_id)
            .and_then(|list| list.last())
            .map(|checkpoint| checkpoint.state.clone()))
    }

    async fn list_checkpoints(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        Ok(self
            .checkpoints
            .read()
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let mut checkpoints = self.checkpoints.write();
        checkpoints
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<bool, StoreError> {
        Ok(self.checkpoints.write().remove(thread_id).is_some())
    }

    async fn threads_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let checkpoints = self.checkpoints.read();
        let threads: BTreeSet<String> = checkpoints
            .iter()
            .filter(|(_, list)| {
                list.iter()
                    .any(|c| c.state.metadata.user_id.as_deref() == Some(user_id))
            })
            .map(|(thread_id, _)| thread_id.clone())
            .collect();
        Ok(threads.into_iter().collect())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
