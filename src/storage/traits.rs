//! Storage trait definitions

use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock poisoned: {0}")]
    Poisoned(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Byte-oriented key-value port for persisted state.
///
/// Implementations must be thread-safe (Send + Sync): the persistence
/// ticker writes from a background task.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key was never set
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Insert or overwrite a value
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Insert or overwrite several values. Backends that can should apply
    /// all of them or none; the default writes them in order.
    fn set_many(&self, entries: &[(&str, Vec<u8>)]) -> StorageResult<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Make previous writes durable
    fn flush(&self) -> StorageResult<()>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: KeyValueStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
