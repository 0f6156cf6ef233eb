//! Process-local document store
//!
//! Keeps every collection in memory behind one lock. Unique indexes are
//! enforced the same way the SQLite store does it, which makes this store the
//! reference backend for pipeline tests and dry runs.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{matches, DocumentStore, Filter, InsertOutcome};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default, Clone)]
struct Collection {
    documents: Vec<Value>,
    /// unique field -> rendered values already present
    unique: HashMap<String, HashSet<String>>,
}

impl Collection {
    fn keys(&self, document: &Value) -> Vec<(String, String)> {
        self.unique
            .keys()
            .filter_map(|field| {
                document
                    .get(field)
                    .map(|value| (field.clone(), value.to_string()))
            })
            .collect()
    }

    /// Rebuild every unique key set from the documents
    fn reindex(&mut self, collection: &str) -> StoreResult<()> {
        for (field, keys) in self.unique.iter_mut() {
            keys.clear();
            for document in &self.documents {
                if let Some(value) = document.get(field) {
                    if !keys.insert(value.to_string()) {
                        return Err(StoreError::Conflict {
                            collection: collection.to_string(),
                            field: field.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-memory [`DocumentStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently held by `collection`
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        Ok(self
            .read_lock()?
            .get(collection)
            .map_or(0, |c| c.documents.len()))
    }

    fn read_lock(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }

    fn write_lock(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| StoreError::backend("memory store lock poisoned"))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, documents: &[Value]) -> StoreResult<InsertOutcome> {
        let mut collections = self.write_lock()?;
        let target = collections.entry(collection.to_string()).or_default();
        let mut outcome = InsertOutcome::default();

        for document in documents {
            let keys = target.keys(document);
            let collides = keys.iter().any(|(field, key)| {
                target
                    .unique
                    .get(field)
                    .is_some_and(|present| present.contains(key))
            });

            if collides {
                outcome.duplicates += 1;
                continue;
            }

            for (field, key) in keys {
                target.unique.entry(field).or_default().insert(key);
            }
            target.documents.push(document.clone());
            outcome.inserted += 1;
        }

        Ok(outcome)
    }

    async fn read(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        let collections = self.read_lock()?;
        Ok(collections
            .get(collection)
            .map(|c| {
                c.documents
                    .iter()
                    .filter(|doc| matches(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, field: &str, unique: bool) -> StoreResult<()> {
        if !unique {
            // reads are full scans, nothing to maintain
            return Ok(());
        }

        let mut collections = self.write_lock()?;
        let target = collections.entry(collection.to_string()).or_default();
        if target.unique.contains_key(field) {
            return Ok(());
        }

        let mut candidate = target.clone();
        candidate.unique.insert(field.to_string(), HashSet::new());
        candidate.reindex(collection)?;
        *target = candidate;
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> StoreResult<u64> {
        let mut collections = self.write_lock()?;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut candidate = target.clone();
        let mut matched = 0;
        for document in candidate.documents.iter_mut() {
            if !matches(document, filter) {
                continue;
            }
            if let Value::Object(fields) = document {
                for (k, v) in changes {
                    fields.insert(k.clone(), v.clone());
                }
            }
            matched += 1;
        }

        candidate.reindex(collection)?;
        *target = candidate;
        Ok(matched)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut collections = self.write_lock()?;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = target.documents.len();
        target.documents.retain(|doc| !matches(doc, filter));
        let removed = (before - target.documents.len()) as u64;
        target.reindex(collection)?;
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::filter;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_read() {
        let store = MemoryStore::new();
        let outcome = store
            .create("Sales", &[json!({"region": "east"}), json!({"region": "west"})])
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.duplicates, 0);

        let all = store.read("Sales", &Filter::new()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["region"], "east");

        let west = store.read("Sales", &filter([("region", "west")])).await.unwrap();
        assert_eq!(west.len(), 1);

        assert!(store.read("Missing", &Filter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unique_index_skips_collisions() {
        let store = MemoryStore::new();
        store.create_index("Sales", "hash", true).await.unwrap();
        store.create_index("Sales", "hash", true).await.unwrap();

        let outcome = store
            .create(
                "Sales",
                &[json!({"hash": "a"}), json!({"hash": "b"}), json!({"hash": "a"})],
            )
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome { inserted: 2, duplicates: 1 });

        let again = store.create("Sales", &[json!({"hash": "b"}), json!({"hash": "c"})]).await.unwrap();
        assert_eq!(again, InsertOutcome { inserted: 1, duplicates: 1 });
        assert_eq!(store.count("Sales").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_index_is_per_collection() {
        let store = MemoryStore::new();
        store.create_index("A", "hash", true).await.unwrap();
        store.create("A", &[json!({"hash": "x"})]).await.unwrap();
        let outcome = store.create("B", &[json!({"hash": "x"}), json!({"hash": "x"})]).await.unwrap();
        assert_eq!(outcome.inserted, 2);
    }

    #[tokio::test]
    async fn test_unique_index_over_duplicates_conflicts() {
        let store = MemoryStore::new();
        store.create("A", &[json!({"k": 1}), json!({"k": 1})]).await.unwrap();
        let err = store.create_index("A", "k", true).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // failed index creation leaves the collection usable and unindexed
        let outcome = store.create("A", &[json!({"k": 1})]).await.unwrap();
        assert_eq!(outcome.inserted, 1);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        store
            .create("A", &[json!({"f": "a", "n": 1}), json!({"f": "b", "n": 1})])
            .await
            .unwrap();

        let mut changes = Map::new();
        changes.insert("n".into(), json!(2));
        let matched = store.update("A", &filter([("f", "a")]), &changes).await.unwrap();
        assert_eq!(matched, 1);
        assert_eq!(store.read("A", &filter([("n", 2)])).await.unwrap().len(), 1);

        let removed = store.delete("A", &filter([("n", 1)])).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count("A").unwrap(), 1);
        assert_eq!(store.delete("Missing", &Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_rejects_unique_violation() {
        let store = MemoryStore::new();
        store.create_index("A", "hash", true).await.unwrap();
        store.create("A", &[json!({"hash": "x"}), json!({"hash": "y"})]).await.unwrap();

        let mut changes = Map::new();
        changes.insert("hash".into(), json!("x"));
        assert!(store.update("A", &Filter::new(), &changes).await.is_err());
        assert_eq!(store.read("A", &filter([("hash", "y")])).await.unwrap().len(), 1);
    }
}
