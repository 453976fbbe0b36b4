use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use parley_core::store::{Checkpoint, ConversationState, ConversationStore, StoreError};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Default database location, relative to the working directory.
pub const DEFAULT_PATH: &str = ".parley/conversations.db";

/// SQLite-based conversation storage
///
/// Each checkpoint is one row. The thread's current state is the row with
/// the highest sequence number.
///
/// # Example
/// ```no_run
/// use parley_sqlite::SqliteConversationStore;
///
/// # fn example() -> Result<(), parley_core::StoreError> {
/// let store = SqliteConversationStore::open(".parley/conversations.db")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SqliteConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Open (or create) a store at `path`.
    ///
    /// Creates the parent directory and the schema if they don't exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let conn = Connection::open(&path)
            .map_err(|e| StoreError::Storage(format!("Failed to open database: {}", e)))?;
        tracing::debug!(path = %path.display(), "opened conversation database");
        Self::with_connection(conn)
    }

    /// A store backed by a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("Failed to open database: {}", e)))?;
        Self::with_connection(conn)
    }

    /// Use default location (.parley/conversations.db in current directory)
    pub fn default_location() -> Result<Self, StoreError> {
        Self::open(DEFAULT_PATH)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(include_str!("schema.sql"))
            .map_err(|e| StoreError::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn storage(e: rusqlite::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

/// Raw checkpoint columns, decoded outside the row callback so JSON errors
/// keep their own variant.
struct CheckpointRow {
    id: String,
    thread_id: String,
    created_at: i64,
    state: String,
}

impl CheckpointRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            created_at: row.get(2)?,
            state: row.get(3)?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint, StoreError> {
        let created_at = DateTime::<Utc>::from_timestamp_millis(self.created_at)
            .ok_or_else(|| {
                StoreError::Storage(format!("Invalid timestamp on checkpoint {}", self.id))
            })?;
        Ok(Checkpoint {
            id: self.id,
            thread_id: self.thread_id,
            created_at,
            state: serde_json::from_str(&self.state)?,
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get_state(&self, thread_id: &str) -> Result<Option<ConversationState>, StoreError> {
        let state: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT state FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC LIMIT 1",
                params![thread_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage)?
        };

        match state {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn list_checkpoints(&self, thread_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare(
                    "SELECT id, thread_id, created_at, state
                     FROM checkpoints WHERE thread_id = ? ORDER BY seq",
                )
                .map_err(storage)?;
            let rows = stmt
                .query_map(params![thread_id], CheckpointRow::from_row)
                .map_err(storage)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(storage)?;
            rows
        };

        rows.into_iter().map(CheckpointRow::into_checkpoint).collect()
    }

    async fn put_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let state = serde_json::to_string(&checkpoint.state)?;
        let metadata = &checkpoint.state.metadata;

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Storage(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO checkpoints (id, thread_id, created_at, run_id, session_id, user_id, state)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                checkpoint.id,
                checkpoint.thread_id,
                checkpoint.created_at.timestamp_millis(),
                metadata.run_id,
                metadata.session_id,
                metadata.user_id,
                state,
            ],
        )
        .map_err(|e| StoreError::Storage(format!("Failed to insert checkpoint: {}", e)))?;

        tx.commit()
            .map_err(|e| StoreError::Storage(format!("Failed to commit transaction: {}", e)))?;

        tracing::debug!(thread_id = %checkpoint.thread_id, checkpoint_id = %checkpoint.id, "checkpoint written");
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM checkpoints WHERE thread_id = ?", params![thread_id])
            .map_err(storage)?;
        Ok(rows > 0)
    }

    async fn threads_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT thread_id FROM checkpoints WHERE user_id = ? ORDER BY thread_id",
            )
            .map_err(storage)?;
        let threads = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;
        Ok(threads)
    }
}
