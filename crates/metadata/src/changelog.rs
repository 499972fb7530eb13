//! Append-only expectation change log and the expectations it adds up to.

use crate::batch::put_in_batches;
use crate::cascade::{delete_changes, spawn_change_cleanup};
use crate::error::{MetadataError, MetadataResult};
use crate::keys::KeyFactory;
use crate::models::{
    EXP_CHANGE_KIND, Entity, ExpChangeRow, FIELD_OK, TEST_DIGEST_EXP_KIND, TestDigestExpRow,
};
use crate::queries::{ChangeFilter, changes_for_issue, children_of};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use tryjob_core::{
    Classifications, ExpectationDelta, Expectations, Label, TriageLogEntry,
    flatten_classifications,
};
use tryjob_storage::{Document, DocumentStore, Key, Query};

/// Milliseconds since the Unix epoch.
pub(crate) fn timestamp_ms(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn change_id(key: &Key) -> MetadataResult<i64> {
    key.key_id()
        .as_id()
        .ok_or_else(|| MetadataError::Constraint(format!("{key} has no numeric change id")))
}

fn decode_deltas(docs: Vec<Document>) -> MetadataResult<Vec<ExpectationDelta>> {
    docs.into_iter()
        .map(|doc| -> MetadataResult<ExpectationDelta> {
            let row = TestDigestExpRow::from_query_result(doc)?;
            Ok(ExpectationDelta {
                test: row.name,
                digest: row.digest,
                label: row.label,
            })
        })
        .collect()
}

/// Append one batch of expectation edits for an issue. Returns the change ID.
///
/// The change record is written incomplete first, then its triples, then
/// the record again marked complete. If a later write fails the partial
/// change is removed in the background and the original error returned.
#[instrument(skip(store, keys, changes))]
pub async fn add_change(
    store: &Arc<dyn DocumentStore>,
    keys: &KeyFactory,
    issue_id: i64,
    changes: &Classifications,
    user_id: &str,
) -> MetadataResult<i64> {
    let deltas = flatten_classifications(changes);
    if deltas.is_empty() {
        return Err(MetadataError::Validation(format!(
            "expectation change for issue {issue_id} contains no labels"
        )));
    }

    let id = store
        .allocate_ids(&EXP_CHANGE_KIND, 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| MetadataError::Constraint("no change id allocated".to_string()))?;
    let change_key = keys.exp_change(id);
    let mut record = ExpChangeRow {
        issue_id,
        user_id: user_id.to_string(),
        timestamp_ms: timestamp_ms(OffsetDateTime::now_utc()),
        ok: false,
    };
    store.put(&change_key, record.to_document()?).await?;

    let completed: MetadataResult<()> = async {
        let child_ids = store
            .allocate_ids(&TEST_DIGEST_EXP_KIND, deltas.len())
            .await?;
        let mut entries = Vec::with_capacity(deltas.len());
        for (child_id, delta) in child_ids.into_iter().zip(&deltas) {
            let row = TestDigestExpRow {
                name: delta.test.clone(),
                digest: delta.digest.clone(),
                label: delta.label,
            };
            entries.push((keys.test_digest_exp(&change_key, child_id)?, row.to_document()?));
        }
        put_in_batches(store.as_ref(), entries).await?;

        record.ok = true;
        store.put(&change_key, record.to_document()?).await?;
        Ok::<(), MetadataError>(())
    }
    .await;

    if let Err(err) = completed {
        tracing::warn!(change_id = id, error = %err, "expectation change failed; discarding it");
        spawn_change_cleanup(Arc::clone(store), change_key);
        return Err(err);
    }

    tracing::debug!(change_id = id, labels = deltas.len(), "expectation change recorded");
    Ok(id)
}

/// Replay the completed changes of an issue, oldest first.
///
/// For a (test, digest) pair edited more than once, the label of the latest
/// change in log order wins.
#[instrument(skip(store, keys))]
pub async fn get_expectations(
    store: &Arc<dyn DocumentStore>,
    keys: &KeyFactory,
    issue_id: i64,
) -> MetadataResult<Expectations> {
    let change_keys: Vec<Key> =
        changes_for_issue(store.as_ref(), keys, issue_id, ChangeFilter::Complete, true)
            .await?
            .into_iter()
            .map(|doc| doc.key)
            .collect();

    let mut expectations = Expectations::new();
    for docs in children_of(store, &change_keys, TEST_DIGEST_EXP_KIND, false).await? {
        expectations.apply(&decode_deltas(docs)?);
    }
    Ok(expectations)
}

/// Page through the completed changes of an issue, newest first.
///
/// Returns the page and the total number of completed changes. Triples are
/// included only when `details` is set.
#[instrument(skip(store, keys))]
pub async fn query_log(
    store: &Arc<dyn DocumentStore>,
    keys: &KeyFactory,
    issue_id: i64,
    offset: usize,
    size: usize,
    details: bool,
) -> MetadataResult<(Vec<TriageLogEntry>, usize)> {
    if size == 0 {
        return Err(MetadataError::Validation(
            "triage log page size must be positive".to_string(),
        ));
    }

    let mut changes =
        changes_for_issue(store.as_ref(), keys, issue_id, ChangeFilter::Complete, false).await?;
    let total = changes.len();
    changes.reverse();

    let page: Vec<(Key, ExpChangeRow)> = changes
        .into_iter()
        .skip(offset)
        .take(size)
        .map(|doc| -> MetadataResult<(Key, ExpChangeRow)> {
            let key = doc.key.clone();
            Ok((key, ExpChangeRow::from_query_result(doc)?))
        })
        .collect::<MetadataResult<_>>()?;
    let page_keys: Vec<Key> = page.iter().map(|(key, _)| key.clone()).collect();
    let children = children_of(store, &page_keys, TEST_DIGEST_EXP_KIND, !details).await?;

    let mut entries = Vec::with_capacity(page.len());
    for ((key, row), docs) in page.into_iter().zip(children) {
        let change_count = docs.len();
        entries.push(TriageLogEntry {
            change_id: change_id(&key)?,
            user_id: row.user_id,
            timestamp_ms: row.timestamp_ms,
            change_count,
            details: if details {
                decode_deltas(docs)?
            } else {
                Vec::new()
            },
        });
    }
    Ok((entries, total))
}

/// Revert one completed change by appending a change that restores the
/// labels its pairs had just before it. Returns the restored labels.
///
/// Pairs that had no label before the change are restored as untriaged.
#[instrument(skip(store, keys))]
pub async fn undo_change(
    store: &Arc<dyn DocumentStore>,
    keys: &KeyFactory,
    issue_id: i64,
    change_id: i64,
    user_id: &str,
) -> MetadataResult<Classifications> {
    let not_found =
        || MetadataError::NotFound(format!("expectation change {change_id} of issue {issue_id}"));

    let target = keys.exp_change(change_id);
    let row = match store.get(&target).await? {
        Some(doc) => ExpChangeRow::from_document(doc)?,
        None => return Err(not_found()),
    };
    if row.issue_id != issue_id || !row.ok {
        return Err(not_found());
    }

    // Replay everything logged before the target to learn the prior labels.
    let change_keys: Vec<Key> =
        changes_for_issue(store.as_ref(), keys, issue_id, ChangeFilter::Complete, true)
            .await?
            .into_iter()
            .map(|doc| doc.key)
            .collect();
    let position = change_keys
        .iter()
        .position(|key| *key == target)
        .ok_or_else(not_found)?;
    let history = &change_keys[..=position];

    let mut batches = children_of(store, history, TEST_DIGEST_EXP_KIND, false).await?;
    let undone = decode_deltas(batches.pop().unwrap_or_default())?;
    let mut prior = Expectations::new();
    for docs in batches {
        prior.apply(&decode_deltas(docs)?);
    }

    let mut restored = Classifications::new();
    for delta in &undone {
        let label: Label = prior.classification(&delta.test, &delta.digest);
        restored
            .entry(delta.test.clone())
            .or_default()
            .insert(delta.digest.clone(), label);
    }

    let new_id = add_change(store, keys, issue_id, &restored, user_id).await?;
    tracing::info!(undone = change_id, change_id = new_id, "expectation change undone");
    Ok(restored)
}

/// Remove changes left incomplete since before `older_than`, with their
/// triples. Returns how many changes were removed.
#[instrument(skip(store, keys))]
pub async fn purge_incomplete_changes(
    store: &Arc<dyn DocumentStore>,
    keys: &KeyFactory,
    older_than: OffsetDateTime,
) -> MetadataResult<usize> {
    let cutoff = timestamp_ms(older_than);
    let query = Query::new(keys.namespace(), EXP_CHANGE_KIND).filter(FIELD_OK, false);

    let mut stale = Vec::new();
    for doc in store.query(&query).await? {
        let key = doc.key.clone();
        if ExpChangeRow::from_query_result(doc)?.timestamp_ms < cutoff {
            stale.push(key);
        }
    }

    let removed = stale.len();
    delete_changes(store, stale).await?;
    if removed > 0 {
        tracing::info!(removed, "purged incomplete expectation changes");
    }
    Ok(removed)
}
