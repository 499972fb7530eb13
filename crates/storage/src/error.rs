//! Storage error types.

use thiserror::Error;

/// Document store operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("batch of {len} exceeds the limit of {max} documents per call")]
    BatchTooLarge { len: usize, max: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
