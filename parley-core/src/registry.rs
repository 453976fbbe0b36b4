//! Process-wide mapping of users to the threads they own.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

/// Registry of `user_id → {thread_id}`.
///
/// Lives for the process only; persisted ownership comes from
/// [`ConversationStore::threads_for_user`](crate::store::ConversationStore::threads_for_user).
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `user_id` owns `thread_id`. Idempotent.
    ///
    /// Returns `true` if the pair was new.
    pub fn register(&self, user_id: &str, thread_id: &str) -> bool {
        self.threads
            .write()
            .entry(user_id.to_string())
            .or_default()
            .insert(thread_id.to_string())
    }

    /// Threads registered for `user_id`, sorted.
    pub fn threads_for(&self, user_id: &str) -> Vec<String> {
        self.threads
            .read()
            .get(user_id)
            .map(|threads| threads.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, user_id: &str, thread_id: &str) -> bool {
        self.threads
            .read()
            .get(user_id)
            .is_some_and(|threads| threads.contains(thread_id))
    }

    /// Forget every registration.
    pub fn clear(&self) {
        self.threads.write().clear();
    }
}
