//! Ledger of ingested source files
//!
//! An append-only collection in the document store. The scanner reads it once
//! per run; writer workers append one entry per completed file. Membership is
//! keyed on the file basename.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::error::StoreResult;
use crate::record::Batch;
use crate::store::{DocumentStore, Filter, InsertOutcome};

/// Collection holding ledger entries
pub const LEDGER_COLLECTION: &str = "ingestedFiles";

/// One completed source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub filename: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub collection: String,
    /// Records parsed from the file
    #[serde(default)]
    pub rows: u64,
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub duplicates: u64,
    pub ingested_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn for_batch(batch: &Batch, outcome: InsertOutcome) -> Self {
        Self {
            filename: batch.filename.clone(),
            path: batch.path.to_string_lossy().into_owned(),
            collection: batch.collection.clone(),
            rows: batch.len() as u64,
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
            ingested_at: Some(Utc::now()),
        }
    }
}

/// Filenames already ingested, loaded once at the start of a run
pub type LedgerSnapshot = HashSet<String>;

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn DocumentStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Read every entry and collect the filenames
    pub async fn snapshot(&self) -> StoreResult<LedgerSnapshot> {
        let documents = self.store.read(LEDGER_COLLECTION, &Filter::new()).await?;

        let mut snapshot = LedgerSnapshot::with_capacity(documents.len());
        for document in documents {
            match document.get("filename").and_then(|f| f.as_str()) {
                Some(filename) => {
                    snapshot.insert(filename.to_string());
                },
                None => warn!(entry = %document, "Ledger entry without filename ignored"),
            }
        }
        Ok(snapshot)
    }

    pub async fn append(&self, entry: &LedgerEntry) -> StoreResult<()> {
        let document = serde_json::to_value(entry)?;
        self.store.create(LEDGER_COLLECTION, &[document]).await?;
        Ok(())
    }

    /// Full entries, newest last
    pub async fn entries(&self) -> StoreResult<Vec<LedgerEntry>> {
        let documents = self.store.read(LEDGER_COLLECTION, &Filter::new()).await?;
        let mut entries = Vec::with_capacity(documents.len());
        for document in documents {
            match serde_json::from_value(document) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "Unreadable ledger entry skipped"),
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::path::PathBuf;

    fn batch(filename: &str) -> Batch {
        Batch {
            collection: "Sales".into(),
            filename: filename.into(),
            path: PathBuf::from("/in").join(filename),
            records: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_append_then_snapshot() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        assert!(ledger.snapshot().await.unwrap().is_empty());

        let outcome = InsertOutcome { inserted: 4, duplicates: 1 };
        ledger.append(&LedgerEntry::for_batch(&batch("a.csv"), outcome)).await.unwrap();
        ledger.append(&LedgerEntry::for_batch(&batch("b.csv"), outcome)).await.unwrap();

        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains("a.csv"));

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries[0].inserted, 4);
        assert_eq!(entries[0].duplicates, 1);
        assert_eq!(entries[0].path, "/in/a.csv");
    }

    #[tokio::test]
    async fn test_same_name_appended_twice() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let entry = LedgerEntry::for_batch(&batch("a.csv"), InsertOutcome::default());
        ledger.append(&entry).await.unwrap();
        ledger.append(&entry).await.unwrap();

        assert_eq!(ledger.entries().await.unwrap().len(), 2);
        assert_eq!(ledger.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_entries_with_only_filename() {
        let store = Arc::new(MemoryStore::new());
        store
            .create(LEDGER_COLLECTION, &[json!({"filename": "old.dat"}), json!({"other": 1})])
            .await
            .unwrap();

        let ledger = Ledger::new(store);
        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("old.dat"));
        assert_eq!(ledger.entries().await.unwrap()[0].rows, 0);
    }
}
