use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tryjob_storage::{DocumentStore, MemoryStore, SqliteStore};

/// One fresh instance of every backend. The SQLite file lives in a
/// temporary directory removed on drop.
pub struct Backends {
    memory: Arc<dyn DocumentStore>,
    sqlite: Arc<dyn DocumentStore>,
    _dir: TempDir,
}

impl Backends {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let sqlite = SqliteStore::new(dir.path().join("contract.db"), Duration::from_secs(5))
            .await
            .expect("failed to open sqlite store");
        Self {
            memory: Arc::new(MemoryStore::new()),
            sqlite: Arc::new(sqlite),
            _dir: dir,
        }
    }

    pub fn all(&self) -> [Arc<dyn DocumentStore>; 2] {
        [Arc::clone(&self.memory), Arc::clone(&self.sqlite)]
    }
}
