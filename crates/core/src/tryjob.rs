//! Issues, patchsets and the trial builds run against them.

use crate::error::{Error, Result};
use crate::params::ParamSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// A code review issue and the patchsets uploaded to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue number assigned by the code review system.
    pub id: i64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub url: String,
    /// Last modification time reported by the code review system.
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    #[serde(default)]
    pub patchsets: Vec<Patchset>,
}

impl Issue {
    /// Create an issue with no patchsets.
    pub fn new(id: i64, updated: OffsetDateTime) -> Self {
        Self {
            id,
            subject: String::new(),
            owner: String::new(),
            status: String::new(),
            url: String::new(),
            updated,
            patchsets: Vec::new(),
        }
    }

    /// Whether this snapshot should replace `current`.
    pub fn is_newer_than(&self, current: &Issue) -> bool {
        self.updated > current.updated
    }

    pub fn find_patchset(&self, patchset_id: i64) -> Option<&Patchset> {
        self.patchsets.iter().find(|ps| ps.id == patchset_id)
    }

    pub fn find_patchset_mut(&mut self, patchset_id: i64) -> Option<&mut Patchset> {
        self.patchsets.iter_mut().find(|ps| ps.id == patchset_id)
    }

    /// Attach tryjobs to their patchsets, keeping each patchset's list
    /// sorted by build ID.
    ///
    /// Fails if a tryjob references a patchset this issue does not contain.
    pub fn attach_tryjobs(&mut self, tryjobs: Vec<Tryjob>) -> Result<()> {
        for tryjob in tryjobs {
            let issue_id = self.id;
            let patchset = self.find_patchset_mut(tryjob.patchset_id).ok_or(
                Error::PatchsetNotFound {
                    issue_id,
                    patchset_id: tryjob.patchset_id,
                },
            )?;
            patchset.tryjobs.push(tryjob);
        }
        for patchset in &mut self.patchsets {
            patchset.tryjobs.sort_by_key(|tj| tj.build_id);
        }
        Ok(())
    }

    /// A copy of this issue without any attached tryjobs.
    pub fn without_tryjobs(&self) -> Issue {
        let mut issue = self.clone();
        for patchset in &mut issue.patchsets {
            patchset.tryjobs.clear();
        }
        issue
    }
}

/// One revision of an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patchset {
    /// Patchset number, unique within its issue.
    pub id: i64,
    /// Commit the patchset was uploaded as, if known.
    #[serde(default)]
    pub commit: String,
    /// Tryjobs run against this patchset. Only populated on read.
    #[serde(default)]
    pub tryjobs: Vec<Tryjob>,
}

impl Patchset {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            commit: String::new(),
            tryjobs: Vec::new(),
        }
    }
}

/// Progress of a tryjob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TryjobStatus {
    Scheduled,
    Running,
    Failed,
    Complete,
    Ingested,
}

impl TryjobStatus {
    /// Position in the tryjob lifecycle. Every status has a distinct rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Scheduled => 0,
            Self::Running => 1,
            Self::Failed => 2,
            Self::Complete => 3,
            Self::Ingested => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Complete => "complete",
            Self::Ingested => "ingested",
        }
    }
}

impl fmt::Display for TryjobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TryjobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "failed" => Ok(Self::Failed),
            "complete" => Ok(Self::Complete),
            "ingested" => Ok(Self::Ingested),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

/// A single trial build against one patchset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tryjob {
    /// Build ID assigned by the build system. Globally unique.
    pub build_id: i64,
    pub issue_id: i64,
    pub patchset_id: i64,
    #[serde(default)]
    pub builder: String,
    pub status: TryjobStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
}

impl Tryjob {
    /// Whether this record should replace `current`.
    ///
    /// Records are ordered by lifecycle rank first and update time second, so
    /// applying a set of updates in any order converges on the same record.
    pub fn is_newer_than(&self, current: &Tryjob) -> bool {
        (self.status.rank(), self.updated) > (current.status.rank(), current.updated)
    }
}

/// The aggregated parameters of one digest produced by a tryjob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryjobResult {
    pub digest: String,
    pub params: ParamSet,
}
