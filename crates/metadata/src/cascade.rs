//! Cascading deletion of an issue and everything it owns.
//!
//! Phases run strictly in order and nothing is rolled back: a failure
//! leaves earlier phases applied. Every phase only deletes what it finds,
//! so re-running a failed deletion finishes the job.

use crate::batch::delete_in_batches;
use crate::error::MetadataResult;
use crate::fanout::TaskGroup;
use crate::keys::KeyFactory;
use crate::models::{TEST_DIGEST_EXP_KIND, TRYJOB_RESULT_KIND};
use crate::queries::{ChangeFilter, changes_for_issue, children_of, tryjobs_for_issue};
use std::sync::Arc;
use tracing::instrument;
use tryjob_storage::{DocumentStore, Key, Query};

/// Delete the issue, its tryjobs and their results, and its expectation
/// changes with their triples.
#[instrument(skip(store, keys))]
pub async fn delete_issue(
    store: &Arc<dyn DocumentStore>,
    keys: &KeyFactory,
    issue_id: i64,
) -> MetadataResult<()> {
    let tryjob_keys: Vec<Key> = tryjobs_for_issue(store, keys, issue_id, &[], true)
        .await?
        .into_iter()
        .map(|doc| doc.key)
        .collect();

    let result_keys: Vec<Key> = children_of(store, &tryjob_keys, TRYJOB_RESULT_KIND, true)
        .await?
        .into_iter()
        .flatten()
        .map(|doc| doc.key)
        .collect();
    delete_in_batches(store.as_ref(), &result_keys).await?;
    delete_in_batches(store.as_ref(), &tryjob_keys).await?;

    // Incomplete changes go too, so nothing of the issue survives.
    let change_keys: Vec<Key> = changes_for_issue(
        store.as_ref(),
        keys,
        issue_id,
        ChangeFilter::All,
        true,
    )
    .await?
    .into_iter()
    .map(|doc| doc.key)
    .collect();
    let change_count = change_keys.len();
    delete_changes(store, change_keys).await?;

    store.delete(&keys.issue(issue_id)).await?;

    tracing::info!(
        tryjobs = tryjob_keys.len(),
        results = result_keys.len(),
        changes = change_count,
        "issue deleted"
    );
    Ok(())
}

/// Delete expectation changes together with their triples.
///
/// The triples of every change and the change records themselves are
/// deleted by sibling tasks of one fan-out.
pub async fn delete_changes(
    store: &Arc<dyn DocumentStore>,
    change_keys: Vec<Key>,
) -> MetadataResult<()> {
    if change_keys.is_empty() {
        return Ok(());
    }

    let mut group = TaskGroup::new();
    for change_key in &change_keys {
        let store = Arc::clone(store);
        let query = Query::new(change_key.namespace(), TEST_DIGEST_EXP_KIND)
            .ancestor(change_key.clone())
            .keys_only();
        group.spawn(async move {
            let children: Vec<Key> = store
                .query(&query)
                .await?
                .into_iter()
                .map(|doc| doc.key)
                .collect();
            delete_in_batches(store.as_ref(), &children).await
        });
    }
    let store = Arc::clone(store);
    group.spawn(async move { delete_in_batches(store.as_ref(), &change_keys).await });

    group.join().await?;
    Ok(())
}

/// Best-effort removal of a change whose write did not complete.
///
/// Runs in the background; a failure is logged and otherwise ignored.
pub fn spawn_change_cleanup(store: Arc<dyn DocumentStore>, change_key: Key) {
    tokio::spawn(async move {
        match delete_changes(&store, vec![change_key.clone()]).await {
            Ok(()) => {
                tracing::debug!(key = %change_key, "removed incomplete expectation change");
            }
            Err(err) => {
                tracing::error!(
                    key = %change_key,
                    error = %err,
                    "failed to remove incomplete expectation change"
                );
            }
        }
    });
}
