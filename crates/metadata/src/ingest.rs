//! Hand-off from result ingestion into the tryjob store.

use crate::error::MetadataResult;
use crate::store::TryjobStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use tryjob_core::{Issue, ParamSet, Params, Tryjob, TryjobResult, TryjobStatus};

/// Looks up an issue and one of its builds in the code review and build
/// systems. Used for tryjobs the store has not seen yet.
#[async_trait]
pub trait IssueBuildFetcher: Send + Sync {
    async fn fetch_issue_and_tryjob(
        &self,
        issue_id: i64,
        build_id: i64,
    ) -> MetadataResult<(Issue, Tryjob)>;
}

/// One parsed result line: the trace parameters and the digest it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEntry {
    pub params: Params,
    pub digest: String,
}

/// Merge entries into one result per digest, sorted by digest.
pub fn aggregate_results(entries: &[ResultEntry]) -> Vec<TryjobResult> {
    let mut by_digest: BTreeMap<&str, ParamSet> = BTreeMap::new();
    for entry in entries {
        by_digest
            .entry(entry.digest.as_str())
            .or_default()
            .add_params(&entry.params);
    }
    by_digest
        .into_iter()
        .map(|(digest, params)| TryjobResult {
            digest: digest.to_string(),
            params,
        })
        .collect()
}

/// Stores the results of one build and marks its tryjob ingested.
pub struct TryjobIngester {
    store: Arc<dyn TryjobStore>,
    fetcher: Arc<dyn IssueBuildFetcher>,
}

impl TryjobIngester {
    pub fn new(store: Arc<dyn TryjobStore>, fetcher: Arc<dyn IssueBuildFetcher>) -> Self {
        Self { store, fetcher }
    }

    /// Ingest the results of build `build_id` of issue `issue_id`.
    ///
    /// Returns the tryjob as written.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn process(
        &self,
        issue_id: i64,
        build_id: i64,
        entries: &[ResultEntry],
    ) -> MetadataResult<Tryjob> {
        let mut tryjob = match self.store.get_tryjob(issue_id, build_id).await? {
            Some(tryjob) => tryjob,
            None => {
                // Normally the build was recorded when it was scheduled.
                tracing::info!("tryjob not in store; fetching it");
                let (issue, tryjob) = self.fetcher.fetch_issue_and_tryjob(issue_id, build_id).await?;
                self.store.update_issue(&issue).await?;
                tryjob
            }
        };

        let results = aggregate_results(entries);
        self.store.update_tryjob_result(&tryjob, &results).await?;

        tryjob.status = TryjobStatus::Ingested;
        self.store.update_tryjob(issue_id, &tryjob).await?;
        tracing::info!(results = results.len(), "tryjob ingested");
        Ok(tryjob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(&str, &str)], digest: &str) -> ResultEntry {
        ResultEntry {
            params: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            digest: digest.to_string(),
        }
    }

    #[test]
    fn test_aggregate_merges_params_per_digest() {
        let results = aggregate_results(&[
            entry(&[("name", "blur"), ("config", "gles")], "bbb"),
            entry(&[("name", "blur"), ("config", "8888")], "bbb"),
            entry(&[("name", "shadow"), ("config", "8888")], "aaa"),
        ]);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].digest, "aaa");
        assert_eq!(results[1].digest, "bbb");
        assert_eq!(
            results[1].params.get("config").unwrap(),
            ["8888".to_string(), "gles".to_string()]
        );
        assert_eq!(results[1].params.get("name").unwrap(), ["blur".to_string()]);
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate_results(&[]).is_empty());
    }
}
