//! In-process document store backend.

use crate::error::{StorageError, StorageResult};
use crate::key::{Key, Kind};
use crate::query::{Document, Query};
use crate::traits::{DocumentStore, UpdateFn, check_batch, check_document};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use tracing::instrument;

#[derive(Default)]
struct Inner {
    docs: BTreeMap<Key, Value>,
    next_ids: HashMap<Kind, i64>,
}

/// Document store held entirely in memory.
///
/// Every call takes the store lock once and releases it before returning,
/// so each call (including multi operations) is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored, across all namespaces.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &Key) -> StorageResult<Option<Value>> {
        key.validate()?;
        Ok(self.inner.lock().await.docs.get(key).cloned())
    }

    async fn get_multi(&self, keys: &[Key]) -> StorageResult<Vec<Option<Value>>> {
        check_batch(keys.iter(), self.max_batch_size())?;
        let inner = self.inner.lock().await;
        Ok(keys.iter().map(|k| inner.docs.get(k).cloned()).collect())
    }

    async fn put(&self, key: &Key, data: Value) -> StorageResult<()> {
        key.validate()?;
        check_document(key, &data)?;
        self.inner.lock().await.docs.insert(key.clone(), data);
        Ok(())
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn put_multi(&self, entries: Vec<(Key, Value)>) -> StorageResult<()> {
        check_batch(entries.iter().map(|(k, _)| k), self.max_batch_size())?;
        for (key, data) in &entries {
            check_document(key, data)?;
        }
        let mut inner = self.inner.lock().await;
        inner.docs.extend(entries);
        Ok(())
    }

    async fn delete(&self, key: &Key) -> StorageResult<()> {
        key.validate()?;
        self.inner.lock().await.docs.remove(key);
        Ok(())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete_multi(&self, keys: &[Key]) -> StorageResult<()> {
        check_batch(keys.iter(), self.max_batch_size())?;
        let mut inner = self.inner.lock().await;
        for key in keys {
            inner.docs.remove(key);
        }
        Ok(())
    }

    #[instrument(skip(self, query), fields(kind = %query.kind()))]
    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        query.validate()?;
        let mut matched: Vec<(Key, Value)> = {
            let inner = self.inner.lock().await;
            inner
                .docs
                .iter()
                .filter(|(key, data)| query.matches(key, data))
                .map(|(key, data)| (key.clone(), data.clone()))
                .collect()
        };
        query.sort(&mut matched);

        let keys_only = query.is_keys_only();
        Ok(matched
            .into_iter()
            .map(|(key, data)| Document {
                key,
                data: (!keys_only).then_some(data),
            })
            .collect())
    }

    async fn allocate_ids(&self, kind: &Kind, count: usize) -> StorageResult<Vec<i64>> {
        let count = i64::try_from(count)
            .map_err(|_| StorageError::InvalidKey(format!("cannot allocate {count} ids")))?;
        let mut inner = self.inner.lock().await;
        let next = inner.next_ids.entry(kind.clone()).or_insert(1);
        let start = *next;
        *next += count;
        Ok((start..*next).collect())
    }

    async fn read_modify_write(&self, key: &Key, update: UpdateFn) -> StorageResult<bool> {
        key.validate()?;
        let mut inner = self.inner.lock().await;
        let current = inner.docs.get(key).cloned();
        match update(current)? {
            Some(data) => {
                check_document(key, &data)?;
                inner.docs.insert(key.clone(), data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyId;
    use crate::query::Direction;
    use serde_json::json;

    const NOTE: Kind = Kind::from_static("Note");
    const LINE: Kind = Kind::from_static("Line");

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        let key = Key::id("ns", NOTE, 1);

        assert_eq!(store.get(&key).await.unwrap(), None);
        store.put(&key, json!({"text": "hi"})).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(json!({"text": "hi"})));

        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_multi_ops_reject_oversized_batches() {
        let store = MemoryStore::new();
        let keys: Vec<Key> = (1..=501).map(|i| Key::id("ns", NOTE, i)).collect();
        assert!(store.delete_multi(&keys).await.is_err());
        assert!(store.delete_multi(&keys[..500]).await.is_ok());
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let store = MemoryStore::new();
        store
            .put_multi(vec![
                (Key::id("ns", NOTE, 1), json!({"owner": 1, "ts": 30})),
                (Key::id("ns", NOTE, 2), json!({"owner": 2, "ts": 10})),
                (Key::id("ns", NOTE, 3), json!({"owner": 1, "ts": 20})),
            ])
            .await
            .unwrap();

        let docs = store
            .query(
                &Query::new("ns", NOTE)
                    .filter("owner", 1)
                    .order("ts", Direction::Ascending)
                    .keys_only(),
            )
            .await
            .unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.key.key_id().as_id().unwrap()).collect();
        assert_eq!(ids, [3, 1]);
        assert!(docs.iter().all(|d| d.data.is_none()));
    }

    #[tokio::test]
    async fn test_ancestor_query() {
        let store = MemoryStore::new();
        let parent = Key::id("ns", NOTE, 1);
        let other = Key::id("ns", NOTE, 2);
        for (owner, name) in [(&parent, "a"), (&parent, "b"), (&other, "a")] {
            let key = owner.child(LINE, KeyId::Name(name.to_string())).unwrap();
            store.put(&key, json!({})).await.unwrap();
        }

        let docs = store
            .query(&Query::new("ns", LINE).ancestor(parent.clone()))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.key.has_ancestor(&parent)));
    }

    #[tokio::test]
    async fn test_allocate_ids_increase_per_kind() {
        let store = MemoryStore::new();
        assert_eq!(store.allocate_ids(&NOTE, 2).await.unwrap(), [1, 2]);
        assert_eq!(store.allocate_ids(&NOTE, 3).await.unwrap(), [3, 4, 5]);
        assert_eq!(store.allocate_ids(&LINE, 1).await.unwrap(), [1]);
        assert!(store.allocate_ids(&LINE, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_modify_write() {
        let store = MemoryStore::new();
        let key = Key::id("ns", NOTE, 9);

        let wrote = store
            .read_modify_write(
                &key,
                Box::new(|current: Option<Value>| -> StorageResult<Option<Value>> {
                    assert!(current.is_none());
                    Ok(Some(json!({"v": 1})))
                }),
            )
            .await
            .unwrap();
        assert!(wrote);

        let wrote = store
            .read_modify_write(
                &key,
                Box::new(|_: Option<Value>| -> StorageResult<Option<Value>> { Ok(None) }),
            )
            .await
            .unwrap();
        assert!(!wrote);
        assert_eq!(store.get(&key).await.unwrap(), Some(json!({"v": 1})));
    }
}
