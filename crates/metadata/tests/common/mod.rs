pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{Stores, issue, labels, result, tryjob};
#[allow(unused_imports)]
pub use mocks::{CountingStore, Fault, FaultyStore};
