//! Tabfeed ingestion library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incrementally loads delimited export files into a document store. File
//! names carry the routing metadata
//! (`OWNER_COLLECTION_SYSTEM_YYYY.MM.DD.HH.MM.SS.ext`), a ledger collection
//! remembers which files are done, and a unique index on each record's `hash`
//! keeps re-ingestion of the same lines idempotent.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabfeed_ingest::{IngestConfig, MemoryStore, Pipeline};
//!
//! # async fn example() -> tabfeed_ingest::Result<()> {
//! let config = IngestConfig::builder().traits([".csv"]).build()?;
//! let pipeline = Pipeline::new(config, Arc::new(MemoryStore::new()))?;
//! let summary = pipeline.run("/data/exports").await?;
//! println!("{} rows written", summary.rows_written);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod scanner;
pub mod source;
pub mod stats;
pub mod store;

pub use config::{IngestConfig, LedgerPolicy};
pub use error::{FailureKind, IngestError, Result, StoreError, StoreResult};
pub use ledger::{Ledger, LedgerEntry, LEDGER_COLLECTION};
pub use pipeline::Pipeline;
pub use stats::RunSummary;
pub use store::{DocumentStore, InsertOutcome, MemoryStore, SqliteStore};
