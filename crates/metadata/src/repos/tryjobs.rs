//! Tryjob repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use tryjob_core::{Tryjob, TryjobResult};

/// Repository for tryjobs and their results.
#[async_trait]
pub trait TryjobRepo: Send + Sync {
    /// Get a tryjob of an issue. Absent tryjobs are `Ok(None)`.
    async fn get_tryjob(&self, issue_id: i64, build_id: i64) -> MetadataResult<Option<Tryjob>>;

    /// Get the tryjobs of an issue (optionally limited to some patchsets)
    /// and their results. Entry `i` of the results belongs to tryjob `i`.
    async fn get_tryjob_results(
        &self,
        issue_id: i64,
        patchset_ids: &[i64],
    ) -> MetadataResult<(Vec<Tryjob>, Vec<Vec<TryjobResult>>)>;

    /// Store a tryjob unless the stored record is at least as new.
    /// Returns whether the tryjob was written.
    async fn update_tryjob(&self, issue_id: i64, tryjob: &Tryjob) -> MetadataResult<bool>;

    /// Store the results of a tryjob, one per digest. Results already stored
    /// under the same digest are overwritten.
    async fn update_tryjob_result(
        &self,
        tryjob: &Tryjob,
        results: &[TryjobResult],
    ) -> MetadataResult<()>;
}
