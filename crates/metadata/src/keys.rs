//! Key derivation for every persisted kind.

use crate::error::MetadataResult;
use crate::models::{
    EXP_CHANGE_KIND, ISSUE_KIND, TEST_DIGEST_EXP_KIND, TRYJOB_KIND, TRYJOB_RESULT_KIND,
};
use tryjob_storage::{Key, KeyId};

/// Builds the keys of one store instance. All keys share its namespace.
#[derive(Debug, Clone)]
pub struct KeyFactory {
    namespace: String,
}

impl KeyFactory {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Issues are keyed by their code review issue number.
    pub fn issue(&self, issue_id: i64) -> Key {
        Key::id(&self.namespace, ISSUE_KIND, issue_id)
    }

    /// Tryjobs are keyed by build ID, independent of their issue.
    pub fn tryjob(&self, build_id: i64) -> Key {
        Key::id(&self.namespace, TRYJOB_KIND, build_id)
    }

    /// Results are named by digest under their tryjob.
    pub fn tryjob_result(&self, tryjob: &Key, digest: &str) -> MetadataResult<Key> {
        Ok(tryjob.child(TRYJOB_RESULT_KIND, KeyId::Name(digest.to_string()))?)
    }

    pub fn exp_change(&self, change_id: i64) -> Key {
        Key::id(&self.namespace, EXP_CHANGE_KIND, change_id)
    }

    pub fn test_digest_exp(&self, change: &Key, id: i64) -> MetadataResult<Key> {
        Ok(change.child(TEST_DIGEST_EXP_KIND, KeyId::Id(id))?)
    }
}
