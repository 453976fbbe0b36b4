//! SQLite-backed conversation storage for parley.
//!
//! [`SqliteConversationStore`] keeps every checkpoint of every thread in a
//! single table, so history survives restarts and can be shared by processes
//! pointing at the same file.

pub mod store;

pub use store::{SqliteConversationStore, DEFAULT_PATH};
