//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("invalid tryjob status: {0}")]
    InvalidStatus(String),

    #[error("patchset {patchset_id} not found in issue {issue_id}")]
    PatchsetNotFound { issue_id: i64, patchset_id: i64 },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
