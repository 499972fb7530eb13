//! Trace parameters and their aggregated form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The key/value parameters describing a single trace.
pub type Params = BTreeMap<String, String>;

/// Every value observed for each parameter key across a set of traces.
///
/// Values are kept sorted and de-duplicated so two param sets built from the
/// same traces in a different order compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, Vec<String>>);

impl ParamSet {
    /// Create an empty param set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a param set holding the values of a single trace.
    pub fn from_params(params: &Params) -> Self {
        let mut set = Self::new();
        set.add_params(params);
        set
    }

    /// Merge the values of one trace into this set.
    pub fn add_params(&mut self, params: &Params) {
        for (key, value) in params {
            let values = self.0.entry(key.clone()).or_default();
            if let Err(pos) = values.binary_search(value) {
                values.insert(pos, value.clone());
            }
        }
    }

    /// Values recorded for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
