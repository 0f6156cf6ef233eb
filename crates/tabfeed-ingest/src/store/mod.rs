//! Document store contract consumed by the pipeline
//!
//! The pipeline only needs bulk insert, filtered read and unique-index
//! creation. `update`/`delete` complete the CRUD surface for tooling built on
//! the same store.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreResult;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Equality constraints on top-level document fields; empty matches all
pub type Filter = Map<String, Value>;

/// Result of an unordered bulk insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub inserted: u64,
    /// Documents skipped because a unique index already held their key
    pub duplicates: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert all documents, skipping the ones that collide with a unique
    /// index. A collision never aborts the rest of the batch.
    async fn create(&self, collection: &str, documents: &[Value]) -> StoreResult<InsertOutcome>;

    /// Documents matching `filter`, in insertion order
    async fn read(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>>;

    /// Idempotent; calling it again for an existing index is a no-op
    async fn create_index(&self, collection: &str, field: &str, unique: bool) -> StoreResult<()>;

    /// Set `changes` on every matching document; returns the match count
    async fn update(&self, collection: &str, filter: &Filter, changes: &Map<String, Value>)
        -> StoreResult<u64>;

    /// Remove every matching document; returns the removed count
    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;
}

/// Whether `document` satisfies every constraint of `filter`
pub fn matches(document: &Value, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

/// Build a filter from `(field, value)` pairs
pub fn filter<I, K, V>(pairs: I) -> Filter
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matches() {
        let doc = json!({"filename": "a.dat", "rows": 3});
        assert!(matches(&doc, &Filter::new()));
        assert!(matches(&doc, &filter([("filename", "a.dat")])));
        assert!(matches(&doc, &filter([("rows", 3)])));
        assert!(!matches(&doc, &filter([("filename", "b.dat")])));
        assert!(!matches(&doc, &filter([("missing", "x")])));
    }
}
