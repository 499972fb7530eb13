//! Metadata store error types.

use thiserror::Error;
use tryjob_storage::StorageError;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tryjob_core::Error> for MetadataError {
    fn from(err: tryjob_core::Error) -> Self {
        match err {
            tryjob_core::Error::PatchsetNotFound { .. } => Self::Constraint(err.to_string()),
            tryjob_core::Error::InvalidLabel(_) | tryjob_core::Error::InvalidStatus(_) => {
                Self::Validation(err.to_string())
            }
        }
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
