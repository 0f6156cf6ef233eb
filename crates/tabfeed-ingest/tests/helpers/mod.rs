//! Test helpers for tabfeed pipeline integration tests
//!
//! - On-disk source trees in temporary directories
//! - A document store wrapper that fails inserts on demand
//! - A document store wrapper that holds record inserts until opened
//! - Ledger and collection assertions

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tabfeed_ingest::store::Filter;
use tabfeed_ingest::{
    DocumentStore, IngestConfig, InsertOutcome, Ledger, MemoryStore, StoreError, StoreResult,
    LEDGER_COLLECTION,
};
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// Write `content` to `dir/name`, creating parent directories
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

pub fn source_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Defaults with millisecond retry backoff
pub fn config() -> IngestConfig {
    IngestConfig::builder().store_retries(3, 1).build().unwrap()
}

pub async fn ledger_names(store: Arc<dyn DocumentStore>) -> Vec<String> {
    let mut names: Vec<String> = Ledger::new(store)
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .collect();
    names.sort();
    names
}

pub async fn documents(store: &dyn DocumentStore, collection: &str) -> Vec<Value> {
    store.read(collection, &Filter::new()).await.unwrap()
}

/// Persistent failure budget for [`FlakyStore::fail_inserts`]
pub const ALWAYS: u32 = u32::MAX;

/// Memory store whose inserts into one collection fail with
/// [`StoreError::Unavailable`] while its failure budget lasts
pub struct FlakyStore {
    inner: MemoryStore,
    target: String,
    failures_left: AtomicU32,
    insert_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(target: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            target: target.to_string(),
            failures_left: AtomicU32::new(0),
            insert_calls: AtomicU32::new(0),
        }
    }

    /// Fail the next `count` inserts into the target collection; [`ALWAYS`]
    /// keeps failing until reset
    pub fn fail_inserts(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn count(&self, collection: &str) -> usize {
        self.inner.count(collection).unwrap()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create(&self, collection: &str, documents: &[Value]) -> StoreResult<InsertOutcome> {
        if collection == self.target {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if self.take_failure() {
                return Err(StoreError::unavailable("connection reset by peer"));
            }
        }
        self.inner.create(collection, documents).await
    }

    async fn read(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        self.inner.read(collection, filter).await
    }

    async fn create_index(&self, collection: &str, field: &str, unique: bool) -> StoreResult<()> {
        self.inner.create_index(collection, field, unique).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> StoreResult<u64> {
        self.inner.update(collection, filter, changes).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.inner.delete(collection, filter).await
    }
}

/// Memory store whose record inserts wait until [`GatedStore::open`]; ledger
/// writes pass straight through
pub struct GatedStore {
    inner: MemoryStore,
    gate: Semaphore,
    indexed: AtomicU32,
    waiting: AtomicU32,
}

impl GatedStore {
    pub fn closed() -> Self {
        Self {
            inner: MemoryStore::new(),
            gate: Semaphore::new(0),
            indexed: AtomicU32::new(0),
            waiting: AtomicU32::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1024);
    }

    /// Record collections indexed so far, one per file a parser has taken
    pub fn indexed(&self) -> u32 {
        self.indexed.load(Ordering::SeqCst)
    }

    /// Inserts entered and not yet let through
    pub fn waiting(&self) -> u32 {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn count(&self, collection: &str) -> usize {
        self.inner.count(collection).unwrap()
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn create(&self, collection: &str, documents: &[Value]) -> StoreResult<InsertOutcome> {
        if collection != LEDGER_COLLECTION {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await;
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
        }
        self.inner.create(collection, documents).await
    }

    async fn read(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        self.inner.read(collection, filter).await
    }

    async fn create_index(&self, collection: &str, field: &str, unique: bool) -> StoreResult<()> {
        if collection != LEDGER_COLLECTION {
            self.indexed.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.create_index(collection, field, unique).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> StoreResult<u64> {
        self.inner.update(collection, filter, changes).await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.inner.delete(collection, filter).await
    }
}
