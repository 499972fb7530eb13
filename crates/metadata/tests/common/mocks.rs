use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tryjob_metadata::models::EXP_CHANGE_KIND;
use tryjob_storage::{
    Document, DocumentStore, Key, Kind, Query, StorageError, StorageResult, UpdateFn,
};

/// Records the size of every `delete_multi` call before delegating.
#[allow(dead_code)]
pub struct CountingStore {
    inner: Arc<dyn DocumentStore>,
    deletes: Mutex<Vec<usize>>,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            deletes: Mutex::new(Vec::new()),
        })
    }

    /// Sizes of the `delete_multi` calls seen so far, in call order.
    pub fn delete_calls(&self) -> Vec<usize> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.deletes.lock().unwrap().clear();
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    async fn get(&self, key: &Key) -> StorageResult<Option<Value>> {
        self.inner.get(key).await
    }

    async fn get_multi(&self, keys: &[Key]) -> StorageResult<Vec<Option<Value>>> {
        self.inner.get_multi(keys).await
    }

    async fn put(&self, key: &Key, data: Value) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn put_multi(&self, entries: Vec<(Key, Value)>) -> StorageResult<()> {
        self.inner.put_multi(entries).await
    }

    async fn delete(&self, key: &Key) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn delete_multi(&self, keys: &[Key]) -> StorageResult<()> {
        self.deletes.lock().unwrap().push(keys.len());
        self.inner.delete_multi(keys).await
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        self.inner.query(query).await
    }

    async fn allocate_ids(&self, kind: &Kind, count: usize) -> StorageResult<Vec<i64>> {
        self.inner.allocate_ids(kind, count).await
    }

    async fn read_modify_write(&self, key: &Key, update: UpdateFn) -> StorageResult<bool> {
        self.inner.read_modify_write(key, update).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

/// Failure injected by [`FaultyStore`].
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail any query filtered on this patchset ID.
    QueryPatchset(i64),
    /// Fail `put_multi` calls writing documents of this kind.
    PutMulti(Kind),
    /// Fail the write that marks an expectation change complete.
    CompleteChange,
    /// Fail every `delete_multi` call.
    DeleteMulti,
}

/// Delegates to an inner store, failing the calls matched by its faults.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: Arc<dyn DocumentStore>,
    faults: Mutex<Vec<Fault>>,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn DocumentStore>, faults: Vec<Fault>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            faults: Mutex::new(faults),
        })
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        self.faults.lock().unwrap().clear();
    }

    fn injected(&self, what: &str) -> StorageError {
        StorageError::Unavailable(format!("injected failure: {what}"))
    }

    fn has(&self, pred: impl Fn(&Fault) -> bool) -> bool {
        self.faults.lock().unwrap().iter().any(pred)
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, key: &Key) -> StorageResult<Option<Value>> {
        self.inner.get(key).await
    }

    async fn get_multi(&self, keys: &[Key]) -> StorageResult<Vec<Option<Value>>> {
        self.inner.get_multi(keys).await
    }

    async fn put(&self, key: &Key, data: Value) -> StorageResult<()> {
        if *key.kind() == EXP_CHANGE_KIND
            && data.get("ok") == Some(&json!(true))
            && self.has(|f| matches!(f, Fault::CompleteChange))
        {
            return Err(self.injected("complete change"));
        }
        self.inner.put(key, data).await
    }

    async fn put_multi(&self, entries: Vec<(Key, Value)>) -> StorageResult<()> {
        if let Some((key, _)) = entries.first()
            && self.has(|f| matches!(f, Fault::PutMulti(kind) if kind == key.kind()))
        {
            return Err(self.injected("put_multi"));
        }
        self.inner.put_multi(entries).await
    }

    async fn delete(&self, key: &Key) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn delete_multi(&self, keys: &[Key]) -> StorageResult<()> {
        if self.has(|f| matches!(f, Fault::DeleteMulti)) {
            return Err(self.injected("delete_multi"));
        }
        self.inner.delete_multi(keys).await
    }

    async fn query(&self, query: &Query) -> StorageResult<Vec<Document>> {
        let failing_patchset = query.filters().iter().any(|(field, value)| {
            field == "patchset_id"
                && self.has(|f| matches!(f, Fault::QueryPatchset(id) if value == &json!(*id)))
        });
        if failing_patchset {
            // Let the other partitions finish first.
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            return Err(self.injected("query"));
        }
        self.inner.query(query).await
    }

    async fn allocate_ids(&self, kind: &Kind, count: usize) -> StorageResult<Vec<i64>> {
        self.inner.allocate_ids(kind, count).await
    }

    async fn read_modify_write(&self, key: &Key, update: UpdateFn) -> StorageResult<bool> {
        self.inner.read_modify_write(key, update).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
