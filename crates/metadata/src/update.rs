//! Newer-wins writes.

use crate::error::MetadataResult;
use crate::models::Versioned;
use serde_json::Value;
use tryjob_storage::{DocumentStore, Key, StorageResult};

/// Write `candidate` at `key` unless the stored entity is at least as new.
///
/// The read and the conditional write run as one transaction on the single
/// document at `key`. Returns whether `candidate` was written. Transaction
/// failures are returned unmodified.
pub async fn update_if_newer<T>(
    store: &dyn DocumentStore,
    key: &Key,
    candidate: &T,
) -> MetadataResult<bool>
where
    T: Versioned + Clone + Send + 'static,
{
    let document = candidate.to_document()?;
    let candidate = candidate.clone();

    let written = store
        .read_modify_write(
            key,
            Box::new(move |current: Option<Value>| -> StorageResult<Option<Value>> {
                let Some(current) = current else {
                    return Ok(Some(document));
                };
                let current: T = serde_json::from_value(current)?;
                Ok(candidate.is_newer_than(&current).then_some(document))
            }),
        )
        .await?;

    if !written {
        tracing::debug!(key = %key, "stored entity is at least as new; update skipped");
    }
    Ok(written)
}
