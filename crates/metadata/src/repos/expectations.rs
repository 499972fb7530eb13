//! Expectation change log repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use time::OffsetDateTime;
use tryjob_core::{Classifications, Expectations, TriageLogEntry};

/// Repository for the per-issue expectation change log.
#[async_trait]
pub trait ExpectationRepo: Send + Sync {
    /// Append a batch of labels for an issue. Returns the new change ID.
    async fn add_change(
        &self,
        issue_id: i64,
        changes: &Classifications,
        user_id: &str,
    ) -> MetadataResult<i64>;

    /// Current expectations of an issue, replayed from its change log.
    async fn get_expectations(&self, issue_id: i64) -> MetadataResult<Expectations>;

    /// Revert a change by appending its inverse. Returns the labels written.
    async fn undo_change(
        &self,
        issue_id: i64,
        change_id: i64,
        user_id: &str,
    ) -> MetadataResult<Classifications>;

    /// Page through the triage log of an issue, newest first. Returns the
    /// page and the total number of entries.
    async fn query_log(
        &self,
        issue_id: i64,
        offset: usize,
        size: usize,
        details: bool,
    ) -> MetadataResult<(Vec<TriageLogEntry>, usize)>;

    /// Remove changes still incomplete since before `older_than`.
    /// Returns how many were removed.
    async fn purge_incomplete_changes(&self, older_than: OffsetDateTime) -> MetadataResult<usize>;
}
