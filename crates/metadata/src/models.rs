//! Persisted entity kinds and their document encoding.

use crate::error::{MetadataError, MetadataResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tryjob_core::{Issue, Label, Tryjob, TryjobResult};
use tryjob_storage::{Document, Kind, StorageError};

pub const ISSUE_KIND: Kind = Kind::from_static("Issue");
pub const TRYJOB_KIND: Kind = Kind::from_static("Tryjob");
pub const TRYJOB_RESULT_KIND: Kind = Kind::from_static("TryjobResult");
pub const EXP_CHANGE_KIND: Kind = Kind::from_static("ExpChange");
pub const TEST_DIGEST_EXP_KIND: Kind = Kind::from_static("TestDigestExp");

// Document property names used in queries.
pub(crate) const FIELD_ISSUE_ID: &str = "issue_id";
pub(crate) const FIELD_PATCHSET_ID: &str = "patchset_id";
pub(crate) const FIELD_OK: &str = "ok";
pub(crate) const FIELD_TIMESTAMP: &str = "timestamp_ms";

/// A type stored as documents of one kind.
pub trait Entity: Serialize + DeserializeOwned {
    const KIND: Kind;

    fn to_document(&self) -> MetadataResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    fn from_document(value: Value) -> MetadataResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Decode a query result. Fails on keys-only documents and on documents
    /// of another kind.
    fn from_query_result(doc: Document) -> MetadataResult<Self> {
        if *doc.key.kind() != Self::KIND {
            return Err(MetadataError::Constraint(format!(
                "{} is not a {} document",
                doc.key,
                Self::KIND
            )));
        }
        match doc.data {
            Some(value) => Self::from_document(value),
            None => Err(StorageError::InvalidQuery(format!(
                "{} was loaded without its data",
                doc.key
            ))
            .into()),
        }
    }
}

/// Entities written through the newer-wins update protocol.
pub trait Versioned: Entity {
    /// Whether `self` should replace the stored `current`.
    fn is_newer_than(&self, current: &Self) -> bool;
}

impl Entity for Issue {
    const KIND: Kind = ISSUE_KIND;
}

impl Versioned for Issue {
    fn is_newer_than(&self, current: &Self) -> bool {
        Issue::is_newer_than(self, current)
    }
}

impl Entity for Tryjob {
    const KIND: Kind = TRYJOB_KIND;
}

impl Versioned for Tryjob {
    fn is_newer_than(&self, current: &Self) -> bool {
        Tryjob::is_newer_than(self, current)
    }
}

impl Entity for TryjobResult {
    const KIND: Kind = TRYJOB_RESULT_KIND;
}

/// One append-only batch of expectation edits for an issue.
///
/// Only records with `ok == true` contribute to expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpChangeRow {
    pub issue_id: i64,
    pub user_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub ok: bool,
}

impl Entity for ExpChangeRow {
    const KIND: Kind = EXP_CHANGE_KIND;
}

/// One (test, digest, label) triple of an expectation change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDigestExpRow {
    pub name: String,
    pub digest: String,
    pub label: Label,
}

impl Entity for TestDigestExpRow {
    const KIND: Kind = TEST_DIGEST_EXP_KIND;
}
