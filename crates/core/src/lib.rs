//! Core domain types shared by the tryjob metadata store.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Code review issues and their patchsets
//! - Tryjobs and the aggregated results they produce
//! - Triage labels, expectation changes and expectations
//! - Configuration for stores and binaries

pub mod config;
pub mod error;
pub mod expectations;
pub mod params;
pub mod tryjob;

pub use error::{Error, Result};
pub use expectations::{
    Classifications, ExpectationDelta, Expectations, Label, TestClassification, TriageLogEntry,
    flatten_classifications,
};
pub use params::{ParamSet, Params};
pub use tryjob::{Issue, Patchset, Tryjob, TryjobResult, TryjobStatus};

/// Maximum number of entities written or deleted by a single store call.
///
/// Kept well below the store's hard limit of 500 entities so a batch also
/// stays under the per-transaction size ceiling.
pub const BATCH_SIZE: usize = 300;
