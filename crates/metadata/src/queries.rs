//! Partitioned listings built on [`TaskGroup`].

use crate::error::{MetadataError, MetadataResult};
use crate::fanout::{PatchsetPartition, TaskGroup};
use crate::keys::KeyFactory;
use crate::models::{
    EXP_CHANGE_KIND, FIELD_ISSUE_ID, FIELD_OK, FIELD_PATCHSET_ID, FIELD_TIMESTAMP, TRYJOB_KIND,
};
use std::sync::Arc;
use tryjob_storage::{Direction, Document, DocumentStore, Key, Kind, Query};

/// Which expectation changes of an issue to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFilter {
    /// Completed changes only.
    Complete,
    /// Every change, including ones still being written.
    All,
}

/// List the tryjobs of an issue, one concurrent query per patchset.
///
/// Results are concatenated in ascending patchset order; within a patchset
/// they are in build ID order. An empty `patchset_ids` lists every tryjob of
/// the issue with a single query.
pub async fn tryjobs_for_issue(
    store: &Arc<dyn DocumentStore>,
    keys: &KeyFactory,
    issue_id: i64,
    patchset_ids: &[i64],
    keys_only: bool,
) -> MetadataResult<Vec<Document>> {
    let mut group = TaskGroup::new();
    for partition in PatchsetPartition::from_filter(patchset_ids) {
        let mut query = Query::new(keys.namespace(), TRYJOB_KIND).filter(FIELD_ISSUE_ID, issue_id);
        if let PatchsetPartition::Patchset(patchset_id) = partition {
            query = query.filter(FIELD_PATCHSET_ID, patchset_id);
        }
        if keys_only {
            query = query.keys_only();
        }
        let store = Arc::clone(store);
        group.spawn(async move { store.query(&query).await.map_err(MetadataError::from) });
    }

    let partitions = group.join().await?;
    Ok(partitions.into_iter().flatten().collect())
}

/// List the `kind` children of each parent, one concurrent query per parent.
///
/// Entry `i` of the output holds the children of `parents[i]`.
pub async fn children_of(
    store: &Arc<dyn DocumentStore>,
    parents: &[Key],
    kind: Kind,
    keys_only: bool,
) -> MetadataResult<Vec<Vec<Document>>> {
    let mut group = TaskGroup::new();
    for parent in parents {
        let mut query = Query::new(parent.namespace(), kind.clone()).ancestor(parent.clone());
        if keys_only {
            query = query.keys_only();
        }
        let store = Arc::clone(store);
        group.spawn(async move { store.query(&query).await.map_err(MetadataError::from) });
    }
    group.join().await
}

/// List the expectation changes of an issue, oldest first.
///
/// Changes with equal timestamps are ordered by change ID.
pub async fn changes_for_issue(
    store: &dyn DocumentStore,
    keys: &KeyFactory,
    issue_id: i64,
    filter: ChangeFilter,
    keys_only: bool,
) -> MetadataResult<Vec<Document>> {
    let mut query = Query::new(keys.namespace(), EXP_CHANGE_KIND)
        .filter(FIELD_ISSUE_ID, issue_id)
        .order(FIELD_TIMESTAMP, Direction::Ascending);
    if filter == ChangeFilter::Complete {
        query = query.filter(FIELD_OK, true);
    }
    if keys_only {
        query = query.keys_only();
    }
    Ok(store.query(&query).await?)
}
