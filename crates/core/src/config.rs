//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Top-level configuration consumed by `tryjobctl` and embedders.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Document store backend.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Tryjob store settings.
    #[serde(default)]
    pub tryjobs: TryjobStoreConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.tryjobs.validate()
    }
}

/// Document store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process store. Contents are lost when the process exits.
    Memory,
    /// SQLite database file.
    Sqlite {
        /// Database file path. `:memory:` opens a private in-memory database.
        path: PathBuf,
        /// How long a writer waits on a locked database before failing.
        #[serde(default = "default_busy_timeout_secs")]
        busy_timeout_secs: u64,
    },
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/tryjobs.db"),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Memory => Ok(()),
            StorageConfig::Sqlite { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err("sqlite config requires a non-empty 'path'".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Settings for one tryjob store instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TryjobStoreConfig {
    /// Namespace qualifying every key written by this instance.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Age in seconds after which an expectation change still marked
    /// incomplete is treated as abandoned and may be purged.
    #[serde(default = "default_incomplete_change_grace_secs")]
    pub incomplete_change_grace_secs: u64,
}

fn default_namespace() -> String {
    "tryjobs".to_string()
}

fn default_incomplete_change_grace_secs() -> u64 {
    3600 // 1 hour
}

impl Default for TryjobStoreConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            incomplete_change_grace_secs: default_incomplete_change_grace_secs(),
        }
    }
}

impl TryjobStoreConfig {
    /// Create a config for the given namespace with default timings.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Get the incomplete-change grace period as a Duration.
    pub fn incomplete_change_grace(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.incomplete_change_grace_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Validate tryjob store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.trim().is_empty() {
            return Err("tryjobs.namespace must not be empty".to_string());
        }
        if self.namespace.chars().any(char::is_control) {
            return Err("tryjobs.namespace must not contain control characters".to_string());
        }
        Ok(())
    }
}
