//! Tryjob metadata store.
//!
//! This crate provides the store behind tryjob triage:
//! - Issues with their patchsets, updated newer-wins
//! - Tryjobs and their per-digest results
//! - Concurrent per-partition listings joined at a single barrier
//! - Cascading deletion of an issue in store-sized batches
//! - The append-only expectation change log and the expectations it yields

pub mod batch;
pub mod cascade;
pub mod changelog;
pub mod error;
pub mod fanout;
pub mod ingest;
pub mod keys;
pub mod models;
pub mod queries;
pub mod repos;
pub mod store;
pub mod update;

pub use error::{MetadataError, MetadataResult};
pub use fanout::{PatchsetPartition, TaskGroup};
pub use ingest::{IssueBuildFetcher, ResultEntry, TryjobIngester, aggregate_results};
pub use keys::KeyFactory;
pub use repos::{ExpectationRepo, IssueRepo, TryjobRepo};
pub use store::{DocTryjobStore, TryjobStore};

use std::sync::Arc;
use tryjob_core::config::AppConfig;

/// Create a tryjob store from configuration.
pub async fn from_config(config: &AppConfig) -> MetadataResult<Arc<DocTryjobStore>> {
    config.validate().map_err(MetadataError::Config)?;
    let documents = tryjob_storage::from_config(&config.storage).await?;
    tracing::info!(
        backend = documents.backend_name(),
        namespace = %config.tryjobs.namespace,
        "tryjob store opened"
    );
    Ok(Arc::new(DocTryjobStore::new(documents, config.tryjobs.clone())?))
}
