//! Key-value persistence
//!
//! Provides:
//! - `KvStore` trait: string keys to string values, no transactions
//! - `SqliteKv` backed by the shared SQLite pool
//! - `MemoryKv` for tests and ephemeral runs
//!
//! The only concurrency primitive is `compare_and_swap`, which lets callers
//! build read-modify-write loops that do not lose updates.

mod memory;
mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

use async_trait::async_trait;
use thiserror::Error;

/// Key-value store errors
#[derive(Debug, Error)]
pub enum KvError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable string-to-string mapping
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` if the key was never written
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Overwrite a value unconditionally (last write wins)
    async fn put(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` meaning the key is absent). Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, KvError>;

    /// Check the backend is reachable
    async fn health_check(&self) -> Result<(), KvError>;
}
