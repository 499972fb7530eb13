//! Bulk writes and deletes split into store-sized chunks.
//!
//! Chunks are sent one after another. A failing chunk stops the loop and
//! leaves earlier chunks committed.

use crate::error::MetadataResult;
use serde_json::Value;
use tracing::instrument;
use tryjob_core::BATCH_SIZE;
use tryjob_storage::{DocumentStore, Key};

/// Delete `keys` in chunks of at most [`BATCH_SIZE`].
#[instrument(skip(store, keys), fields(keys = keys.len()))]
pub async fn delete_in_batches(store: &dyn DocumentStore, keys: &[Key]) -> MetadataResult<()> {
    for (n, chunk) in keys.chunks(BATCH_SIZE).enumerate() {
        tracing::trace!(batch = n, len = chunk.len(), "deleting batch");
        store.delete_multi(chunk).await?;
    }
    Ok(())
}

/// Write `entries` in chunks of at most [`BATCH_SIZE`].
#[instrument(skip(store, entries), fields(keys = entries.len()))]
pub async fn put_in_batches(
    store: &dyn DocumentStore,
    entries: Vec<(Key, Value)>,
) -> MetadataResult<()> {
    let mut entries = entries.into_iter();
    loop {
        let chunk: Vec<(Key, Value)> = entries.by_ref().take(BATCH_SIZE).collect();
        if chunk.is_empty() {
            return Ok(());
        }
        store.put_multi(chunk).await?;
    }
}
