//! Storage adapters for the event log.
//!
//! The engine persists two string records through the [`StorageAdapter`]
//! trait: the current session and the retained events, each as JSON. The
//! adapter is a plain async key-value contract, so any host store can back it.
//!
//! Provided adapters:
//! - [`MemoryStore`]: process-local map, for tests and ephemeral hosts
//! - [`FileStore`]: one file per key inside a directory
//! - [`SqliteStore`]: a single `kv` table in a `SQLite` database
//!
//! # Concurrency
//!
//! Adapters must be `Send + Sync`, but the engine never issues overlapping
//! writes to the same key from more than one process. Multi-process access to
//! one store is not supported.

mod file;
mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// The key cannot be stored by this adapter.
    #[error("invalid storage key: {key:?}")]
    InvalidKey { key: String },
}

/// Async string key-value storage.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Deletes `key`. Deleting an absent key succeeds.
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: StorageAdapter + ?Sized> StorageAdapter for Arc<S> {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove_item(key).await
    }
}
