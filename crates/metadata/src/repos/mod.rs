//! Repository traits for tryjob store operations.

pub mod expectations;
pub mod issues;
pub mod tryjobs;

pub use expectations::ExpectationRepo;
pub use issues::IssueRepo;
pub use tryjobs::TryjobRepo;
