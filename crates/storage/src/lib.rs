//! Keyed document storage for the tryjob metadata store.
//!
//! This crate provides:
//! - Hierarchical keys (namespace, optional parent, kind, numeric ID or name)
//! - Kind-scoped queries with equality filters, one sort order and
//!   ancestor restriction
//! - Single-document read-modify-write transactions
//! - Backends: in-process memory and SQLite

pub mod backends;
pub mod error;
pub mod key;
pub mod query;
pub mod traits;

pub use backends::{memory::MemoryStore, sqlite::SqliteStore};
pub use error::{StorageError, StorageResult};
pub use key::{Ancestor, Key, KeyId, Kind};
pub use query::{Direction, Document, Query};
pub use traits::{DocumentStore, MAX_BATCH_SIZE, UpdateFn};

use std::sync::Arc;
use std::time::Duration;
use tryjob_core::config::StorageConfig;

/// Create a document store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn DocumentStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageConfig::Sqlite {
            path,
            busy_timeout_secs,
        } => {
            let store = SqliteStore::new(path, Duration::from_secs(*busy_timeout_secs)).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_memory_ok() {
        let store = from_config(&StorageConfig::Memory).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn from_config_sqlite_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Sqlite {
            path: temp.path().join("nested").join("docs.db"),
            busy_timeout_secs: 1,
        };

        let store = from_config(&config).await.unwrap();
        let key = Key::name("ns", Kind::from_static("Thing"), "a");
        store.put(&key, json!({"x": 1})).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(store.backend_name(), "sqlite");
    }

    #[tokio::test]
    async fn from_config_rejects_empty_sqlite_path() {
        let config = StorageConfig::Sqlite {
            path: "".into(),
            busy_timeout_secs: 1,
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
