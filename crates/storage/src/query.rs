//! Kind-scoped queries with equality filters and a single sort order.

use crate::error::{StorageError, StorageResult};
use crate::key::{Key, Kind};
use serde_json::Value;
use std::cmp::Ordering;

/// Sort direction of a query order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A document returned by a query. `data` is `None` for keys-only queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: Key,
    pub data: Option<Value>,
}

/// A query over the documents of one kind in one namespace.
///
/// Results are ordered by the requested property (if any) and then by key,
/// so every query has a deterministic result order.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    namespace: String,
    kind: Kind,
    ancestor: Option<Key>,
    filters: Vec<(String, Value)>,
    order: Option<(String, Direction)>,
    keys_only: bool,
}

impl Query {
    pub fn new(namespace: impl Into<String>, kind: Kind) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            ancestor: None,
            filters: Vec::new(),
            order: None,
            keys_only: false,
        }
    }

    /// Restrict results to direct children of `ancestor`.
    pub fn ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    /// Require top-level property `field` to equal `value`.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((field.into(), direction));
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn ancestor_key(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<(&str, Direction)> {
        self.order.as_ref().map(|(field, dir)| (field.as_str(), *dir))
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    /// Reject filters no backend can evaluate.
    pub fn validate(&self) -> StorageResult<()> {
        if let Some(ancestor) = &self.ancestor {
            if ancestor.namespace() != self.namespace {
                return Err(StorageError::InvalidQuery(format!(
                    "ancestor {ancestor} is outside namespace {}",
                    self.namespace
                )));
            }
            if ancestor.parent().is_some() {
                return Err(StorageError::InvalidQuery(format!(
                    "ancestor {ancestor} must be a top-level key"
                )));
            }
        }
        for (field, value) in &self.filters {
            if field.is_empty() {
                return Err(StorageError::InvalidQuery(
                    "filter field must not be empty".to_string(),
                ));
            }
            if matches!(value, Value::Array(_) | Value::Object(_)) {
                return Err(StorageError::InvalidQuery(format!(
                    "filter on {field} must compare against a scalar"
                )));
            }
        }
        Ok(())
    }

    /// Whether the document stored at `key` satisfies this query.
    pub fn matches(&self, key: &Key, data: &Value) -> bool {
        key.namespace() == self.namespace
            && *key.kind() == self.kind
            && self.ancestor.as_ref().is_none_or(|a| key.has_ancestor(a))
            && self
                .filters
                .iter()
                .all(|(field, value)| data.get(field).is_some_and(|v| scalar_eq(v, value)))
    }

    /// Sort matched documents into query order.
    pub fn sort(&self, docs: &mut [(Key, Value)]) {
        match &self.order {
            Some((field, direction)) => docs.sort_by(|(ka, a), (kb, b)| {
                let by_field = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                let by_field = match direction {
                    Direction::Ascending => by_field,
                    Direction::Descending => by_field.reverse(),
                };
                by_field.then_with(|| ka.cmp(kb))
            }),
            None => docs.sort_by(|(ka, _), (kb, _)| ka.cmp(kb)),
        }
    }
}

fn scalar_eq(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a == b,
            _ => a.as_f64() == b.as_f64(),
        },
        _ => stored == wanted,
    }
}

/// Total order over JSON scalars: null < bool < number < string.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => rank(a).cmp(&rank(b)),
    }
}
