//! In-memory catalog store.
//!
//! Used for `storage.backend = "memory"` and throughout the tests. Reads and
//! writes can be made to fail on demand to exercise degraded paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::store::{CatalogStore, Collection};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Value>>>,
    write_counts: RwLock<HashMap<Collection, usize>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `list`/`get` fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `upsert`/`delete` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful upserts into a collection.
    pub fn write_count(&self, collection: Collection) -> usize {
        self.write_counts
            .read()
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }

    /// Number of documents currently held in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .get(&collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    fn check_read(&self, collection: Collection) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::storage(collection, "injected read failure"));
        }
        Ok(())
    }

    fn check_write(&self, collection: Collection) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage(collection, "injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list(&self, collection: Collection) -> Result<Vec<Value>> {
        self.check_read(collection)?;
        Ok(self
            .collections
            .read()
            .get(&collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        self.check_read(collection)?;
        Ok(self
            .collections
            .read()
            .get(&collection)
            .and_then(|docs| docs.get(id).cloned()))
    }

    async fn upsert(&self, collection: Collection, id: &str, document: Value) -> Result<()> {
        self.check_write(collection)?;
        self.collections
            .write()
            .entry(collection)
            .or_default()
            .insert(id.to_string(), document);
        *self.write_counts.write().entry(collection).or_insert(0) += 1;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.check_write(collection)?;
        if let Some(docs) = self.collections.write().get_mut(&collection) {
            docs.remove(id);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_get_delete() {
        let store = MemoryStore::new();
        store
            .upsert(Collection::Personas, "p1", json!({"id": "p1"}))
            .await
            .unwrap();
        assert_eq!(store.write_count(Collection::Personas), 1);
        assert!(store.get(Collection::Personas, "p1").await.unwrap().is_some());
        assert!(store.get(Collection::Conditions, "p1").await.unwrap().is_none());

        store.delete(Collection::Personas, "p1").await.unwrap();
        assert!(store.is_empty(Collection::Personas));
        store.delete(Collection::Personas, "missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store
            .upsert(Collection::Sessions, "s1", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sessions"));
        assert_eq!(store.write_count(Collection::Sessions), 0);

        store.set_fail_writes(false);
        store.set_fail_reads(true);
        assert!(store.list(Collection::Sessions).await.is_err());
    }
}
