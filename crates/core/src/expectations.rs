//! Triage labels and the expectations they add up to.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Triage verdict for one digest of one test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    #[default]
    Untriaged,
    Positive,
    Negative,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untriaged => "untriaged",
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "untriaged" => Ok(Self::Untriaged),
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            other => Err(Error::InvalidLabel(other.to_string())),
        }
    }
}

/// Labels for the digests of a single test, keyed by digest.
pub type TestClassification = BTreeMap<String, Label>;

/// Labels for many tests, keyed by test name.
pub type Classifications = BTreeMap<String, TestClassification>;

/// One (test, digest, label) triple of an expectation change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationDelta {
    pub test: String,
    pub digest: String,
    pub label: Label,
}

/// Flatten a classification map into its triples, ordered by test then digest.
pub fn flatten_classifications(changes: &Classifications) -> Vec<ExpectationDelta> {
    changes
        .iter()
        .flat_map(|(test, classification)| {
            classification.iter().map(move |(digest, label)| ExpectationDelta {
                test: test.clone(),
                digest: digest.clone(),
                label: *label,
            })
        })
        .collect()
}

/// The current label of every triaged (test, digest) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expectations(Classifications);

impl Expectations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `label` for (test, digest), replacing any earlier label.
    pub fn set(&mut self, test: &str, digest: &str, label: Label) {
        self.0
            .entry(test.to_string())
            .or_default()
            .insert(digest.to_string(), label);
    }

    /// Apply a batch of triples in order; later triples win.
    pub fn apply<'a>(&mut self, deltas: impl IntoIterator<Item = &'a ExpectationDelta>) {
        for delta in deltas {
            self.set(&delta.test, &delta.digest, delta.label);
        }
    }

    /// Label of (test, digest), `Untriaged` when never triaged.
    pub fn classification(&self, test: &str, digest: &str) -> Label {
        self.0
            .get(test)
            .and_then(|digests| digests.get(digest))
            .copied()
            .unwrap_or_default()
    }

    /// Number of (test, digest) pairs with a label.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One entry of an issue's triage log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageLogEntry {
    pub change_id: i64,
    pub user_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub change_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ExpectationDelta>,
}
