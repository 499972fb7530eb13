//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use crate::key::{Key, Kind};
use crate::query::{Document, Query};
use async_trait::async_trait;
use serde_json::Value;

/// Hard limit on the number of documents a single multi operation may touch.
pub const MAX_BATCH_SIZE: usize = 500;

/// Decides the outcome of a single-document transaction.
///
/// Receives the document currently stored at the key (or `None`) and returns
/// `Some(doc)` to write `doc`, or `None` to leave the key untouched.
pub type UpdateFn = Box<dyn FnOnce(Option<Value>) -> StorageResult<Option<Value>> + Send>;

/// Document store abstraction.
///
/// Documents are JSON objects addressed by [`Key`]. A missing document is
/// never an error: reads return `None` and deletes are no-ops.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Get one document.
    async fn get(&self, key: &Key) -> StorageResult<Option<Value>>;

    /// Get several documents. The output is index-aligned with `keys`.
    async fn get_multi(&self, keys: &[Key]) -> StorageResult<Vec<Option<Value>>>;

    /// Write one document, replacing whatever was stored at `key`.
    async fn put(&self, key: &Key, data: Value) -> StorageResult<()>;

    /// Write several documents atomically.
    async fn put_multi(&self, entries: Vec<(Key, Value)>) -> StorageResult<()>;

    /// Delete one document.
    async fn delete(&self, key: &Key) -> StorageResult<()>;

    /// Delete several documents atomically.
    async fn delete_multi(&self, keys: &[Key]) -> StorageResult<()>;

    /// Run a query. Keys-only queries return documents without data.
    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>>;

    /// Reserve `count` fresh numeric IDs for `kind`.
    ///
    /// IDs are positive, strictly increasing across calls and never reused.
    async fn allocate_ids(&self, kind: &Kind, count: usize) -> StorageResult<Vec<i64>>;

    /// Read the document at `key` and conditionally replace it, as one
    /// transaction scoped to that single document.
    ///
    /// Returns whether a write happened. Transaction failures are returned
    /// as-is; the store never retries.
    async fn read_modify_write(&self, key: &Key, update: UpdateFn) -> StorageResult<bool>;

    /// Get the name of this storage backend.
    ///
    /// Used for logging.
    fn backend_name(&self) -> &'static str;

    /// Maximum number of documents accepted by one multi operation.
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Validate the keys of a multi operation against the backend's batch limit.
pub fn check_batch<'a>(
    keys: impl ExactSizeIterator<Item = &'a Key>,
    max: usize,
) -> StorageResult<()> {
    let len = keys.len();
    if len > max {
        return Err(StorageError::BatchTooLarge { len, max });
    }
    for key in keys {
        key.validate()?;
    }
    Ok(())
}

/// Require a document to be a JSON object.
pub fn check_document(key: &Key, data: &Value) -> StorageResult<()> {
    if !data.is_object() {
        return Err(StorageError::InvalidDocument(format!(
            "document at {key} must be a JSON object"
        )));
    }
    Ok(())
}
