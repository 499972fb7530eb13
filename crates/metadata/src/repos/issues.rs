//! Issue repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use tryjob_core::Issue;

/// Repository for code review issues.
#[async_trait]
pub trait IssueRepo: Send + Sync {
    /// List every stored issue, ordered by issue ID, with the total count.
    /// Listed issues carry no tryjobs.
    async fn list_issues(&self) -> MetadataResult<(Vec<Issue>, usize)>;

    /// Get an issue, or `None` if it is not stored.
    ///
    /// With `load_tryjobs`, the tryjobs of the issue are attached to their
    /// patchsets, sorted by build ID. A non-empty `patchset_ids` limits the
    /// attached tryjobs to those patchsets.
    async fn get_issue(
        &self,
        issue_id: i64,
        load_tryjobs: bool,
        patchset_ids: &[i64],
    ) -> MetadataResult<Option<Issue>>;

    /// Store an issue snapshot unless the stored one is at least as new.
    /// Returns whether the snapshot was written. Tryjobs are never persisted
    /// with the issue.
    async fn update_issue(&self, issue: &Issue) -> MetadataResult<bool>;

    /// Delete an issue and everything it owns.
    ///
    /// Not atomic: on error, part of the issue's data may already be gone.
    /// Calling it again completes the deletion.
    async fn delete_issue(&self, issue_id: i64) -> MetadataResult<()>;
}
