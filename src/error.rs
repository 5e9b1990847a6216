//! Top-level error type

use crate::config::ConfigError;
use crate::signal::{DeepSignalError, EmbeddingError};
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdiolectError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Deep signal error: {0}")]
    DeepSignal(#[from] DeepSignalError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type IdiolectResult<T> = Result<T, IdiolectError>;
