//! Tryjob store trait and its document store implementation.

use crate::batch::put_in_batches;
use crate::error::{MetadataError, MetadataResult};
use crate::keys::KeyFactory;
use crate::models::{Entity, ISSUE_KIND, TRYJOB_RESULT_KIND};
use crate::queries::{children_of, tryjobs_for_issue};
use crate::repos::{ExpectationRepo, IssueRepo, TryjobRepo};
use crate::update::update_if_newer;
use crate::{cascade, changelog};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tryjob_core::config::TryjobStoreConfig;
use tryjob_core::{
    Classifications, Expectations, Issue, TriageLogEntry, Tryjob, TryjobResult,
};
use tryjob_storage::{DocumentStore, Key, Query};

/// Combined tryjob store trait.
#[async_trait]
pub trait TryjobStore: IssueRepo + TryjobRepo + ExpectationRepo + Send + Sync {
    /// Check connectivity of the backing document store.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Name of the backing document store, for logging.
    fn backend_name(&self) -> &'static str;
}

/// Tryjob store over any [`DocumentStore`].
///
/// Holds no state of its own besides configuration; all coordination goes
/// through the document store's single-document transactions.
pub struct DocTryjobStore {
    store: Arc<dyn DocumentStore>,
    keys: KeyFactory,
    config: TryjobStoreConfig,
}

impl DocTryjobStore {
    pub fn new(store: Arc<dyn DocumentStore>, config: TryjobStoreConfig) -> MetadataResult<Self> {
        config.validate().map_err(MetadataError::Config)?;
        Ok(Self {
            keys: KeyFactory::new(&config.namespace),
            store,
            config,
        })
    }

    pub fn namespace(&self) -> &str {
        self.keys.namespace()
    }

    /// The document store this instance writes to.
    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Purge changes left incomplete for longer than the configured grace
    /// period.
    ///
    /// A grace period reaching back before the earliest representable time
    /// leaves nothing old enough to purge.
    pub async fn purge_abandoned_changes(&self) -> MetadataResult<usize> {
        let grace = self.config.incomplete_change_grace();
        match OffsetDateTime::now_utc().checked_sub(grace) {
            Some(older_than) => self.purge_incomplete_changes(older_than).await,
            None => {
                tracing::debug!(
                    grace_secs = self.config.incomplete_change_grace_secs,
                    "grace period exceeds the time range; nothing to purge"
                );
                Ok(0)
            }
        }
    }
}

#[async_trait]
impl TryjobStore for DocTryjobStore {
    async fn health_check(&self) -> MetadataResult<()> {
        self.store.health_check().await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}

#[async_trait]
impl IssueRepo for DocTryjobStore {
    async fn list_issues(&self) -> MetadataResult<(Vec<Issue>, usize)> {
        let docs = self
            .store
            .query(&Query::new(self.keys.namespace(), ISSUE_KIND))
            .await?;
        let issues = docs
            .into_iter()
            .map(Issue::from_query_result)
            .collect::<MetadataResult<Vec<_>>>()?;
        let count = issues.len();
        Ok((issues, count))
    }

    async fn get_issue(
        &self,
        issue_id: i64,
        load_tryjobs: bool,
        patchset_ids: &[i64],
    ) -> MetadataResult<Option<Issue>> {
        let Some(doc) = self.store.get(&self.keys.issue(issue_id)).await? else {
            return Ok(None);
        };
        let mut issue = Issue::from_document(doc)?;

        if load_tryjobs {
            let tryjobs = tryjobs_for_issue(&self.store, &self.keys, issue_id, patchset_ids, false)
                .await?
                .into_iter()
                .map(Tryjob::from_query_result)
                .collect::<MetadataResult<Vec<_>>>()?;
            issue.attach_tryjobs(tryjobs)?;
        }
        Ok(Some(issue))
    }

    async fn update_issue(&self, issue: &Issue) -> MetadataResult<bool> {
        let key = self.keys.issue(issue.id);
        update_if_newer(self.store.as_ref(), &key, &issue.without_tryjobs()).await
    }

    async fn delete_issue(&self, issue_id: i64) -> MetadataResult<()> {
        cascade::delete_issue(&self.store, &self.keys, issue_id).await
    }
}

#[async_trait]
impl TryjobRepo for DocTryjobStore {
    async fn get_tryjob(&self, issue_id: i64, build_id: i64) -> MetadataResult<Option<Tryjob>> {
        let Some(doc) = self.store.get(&self.keys.tryjob(build_id)).await? else {
            return Ok(None);
        };
        let tryjob = Tryjob::from_document(doc)?;
        if tryjob.issue_id != issue_id {
            tracing::warn!(
                build_id,
                issue_id,
                stored_issue_id = tryjob.issue_id,
                "tryjob belongs to a different issue"
            );
            return Ok(None);
        }
        Ok(Some(tryjob))
    }

    async fn get_tryjob_results(
        &self,
        issue_id: i64,
        patchset_ids: &[i64],
    ) -> MetadataResult<(Vec<Tryjob>, Vec<Vec<TryjobResult>>)> {
        let docs = tryjobs_for_issue(&self.store, &self.keys, issue_id, patchset_ids, false).await?;
        let tryjob_keys: Vec<Key> = docs.iter().map(|doc| doc.key.clone()).collect();
        let tryjobs = docs
            .into_iter()
            .map(Tryjob::from_query_result)
            .collect::<MetadataResult<Vec<_>>>()?;

        let results = children_of(&self.store, &tryjob_keys, TRYJOB_RESULT_KIND, false)
            .await?
            .into_iter()
            .map(|docs| {
                docs.into_iter()
                    .map(TryjobResult::from_query_result)
                    .collect::<MetadataResult<Vec<_>>>()
            })
            .collect::<MetadataResult<Vec<_>>>()?;
        Ok((tryjobs, results))
    }

    async fn update_tryjob(&self, issue_id: i64, tryjob: &Tryjob) -> MetadataResult<bool> {
        if tryjob.issue_id != issue_id {
            return Err(MetadataError::Validation(format!(
                "tryjob {} belongs to issue {}, not {issue_id}",
                tryjob.build_id, tryjob.issue_id
            )));
        }
        update_if_newer(self.store.as_ref(), &self.keys.tryjob(tryjob.build_id), tryjob).await
    }

    async fn update_tryjob_result(
        &self,
        tryjob: &Tryjob,
        results: &[TryjobResult],
    ) -> MetadataResult<()> {
        let tryjob_key = self.keys.tryjob(tryjob.build_id);
        let mut digests = HashSet::with_capacity(results.len());
        let mut entries = Vec::with_capacity(results.len());
        for result in results {
            if result.digest.is_empty() {
                return Err(MetadataError::Validation(format!(
                    "result of tryjob {} has an empty digest",
                    tryjob.build_id
                )));
            }
            if !digests.insert(result.digest.as_str()) {
                return Err(MetadataError::Validation(format!(
                    "digest {} appears more than once for tryjob {}",
                    result.digest, tryjob.build_id
                )));
            }
            let key = self.keys.tryjob_result(&tryjob_key, &result.digest)?;
            entries.push((key, result.to_document()?));
        }

        put_in_batches(self.store.as_ref(), entries).await?;
        tracing::debug!(build_id = tryjob.build_id, results = results.len(), "stored tryjob results");
        Ok(())
    }
}

#[async_trait]
impl ExpectationRepo for DocTryjobStore {
    async fn add_change(
        &self,
        issue_id: i64,
        changes: &Classifications,
        user_id: &str,
    ) -> MetadataResult<i64> {
        changelog::add_change(&self.store, &self.keys, issue_id, changes, user_id).await
    }

    async fn get_expectations(&self, issue_id: i64) -> MetadataResult<Expectations> {
        changelog::get_expectations(&self.store, &self.keys, issue_id).await
    }

    async fn undo_change(
        &self,
        issue_id: i64,
        change_id: i64,
        user_id: &str,
    ) -> MetadataResult<Classifications> {
        changelog::undo_change(&self.store, &self.keys, issue_id, change_id, user_id).await
    }

    async fn query_log(
        &self,
        issue_id: i64,
        offset: usize,
        size: usize,
        details: bool,
    ) -> MetadataResult<(Vec<TriageLogEntry>, usize)> {
        changelog::query_log(&self.store, &self.keys, issue_id, offset, size, details).await
    }

    async fn purge_incomplete_changes(&self, older_than: OffsetDateTime) -> MetadataResult<usize> {
        changelog::purge_incomplete_changes(&self.store, &self.keys, older_than).await
    }
}
