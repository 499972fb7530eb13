use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::datetime;
use tryjob_core::config::TryjobStoreConfig;
use tryjob_core::{
    Classifications, Issue, Label, ParamSet, Patchset, Params, Tryjob, TryjobResult,
    TryjobStatus,
};
use tryjob_metadata::DocTryjobStore;
use tryjob_storage::{DocumentStore, MemoryStore, SqliteStore};

pub const T0: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

/// A tryjob store over each document store backend.
#[allow(dead_code)]
pub struct Stores {
    pub memory: Arc<DocTryjobStore>,
    pub sqlite: Arc<DocTryjobStore>,
    _dir: TempDir,
}

#[allow(dead_code)]
impl Stores {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let sqlite = SqliteStore::new(dir.path().join("tryjobs.db"), Duration::from_secs(5))
            .await
            .expect("failed to open sqlite store");
        Self {
            memory: over(Arc::new(MemoryStore::new())),
            sqlite: over(Arc::new(sqlite)),
            _dir: dir,
        }
    }

    pub fn all(&self) -> [Arc<DocTryjobStore>; 2] {
        [Arc::clone(&self.memory), Arc::clone(&self.sqlite)]
    }
}

/// A tryjob store in the test namespace over `documents`.
#[allow(dead_code)]
pub fn over(documents: Arc<dyn DocumentStore>) -> Arc<DocTryjobStore> {
    let store = DocTryjobStore::new(documents, TryjobStoreConfig::with_namespace("gold-test"))
        .expect("valid test config");
    Arc::new(store)
}

#[allow(dead_code)]
pub fn issue(id: i64, patchsets: &[i64]) -> Issue {
    let mut issue = Issue::new(id, T0);
    issue.subject = format!("Issue {id}");
    issue.owner = "alice@example.com".to_string();
    issue.patchsets = patchsets.iter().copied().map(Patchset::new).collect();
    issue
}

#[allow(dead_code)]
pub fn tryjob(build_id: i64, issue_id: i64, patchset_id: i64, status: TryjobStatus) -> Tryjob {
    Tryjob {
        build_id,
        issue_id,
        patchset_id,
        builder: format!("Test-Builder-{patchset_id}"),
        status,
        updated: T0,
    }
}

#[allow(dead_code)]
pub fn result(test: &str, digest: &str) -> TryjobResult {
    let params: Params = [
        ("name".to_string(), test.to_string()),
        ("config".to_string(), "8888".to_string()),
    ]
    .into_iter()
    .collect();
    TryjobResult {
        digest: digest.to_string(),
        params: ParamSet::from_params(&params),
    }
}

#[allow(dead_code)]
pub fn labels(triples: &[(&str, &str, Label)]) -> Classifications {
    let mut out = Classifications::new();
    for (test, digest, label) in triples {
        out.entry(test.to_string())
            .or_default()
            .insert(digest.to_string(), *label);
    }
    out
}
