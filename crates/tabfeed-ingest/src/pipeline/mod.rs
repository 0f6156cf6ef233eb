//! Concurrent ingestion pipeline
//!
//! Scanner → file-task queue → parser pool → bounded batch queue → writer
//! pool → store + ledger. The task queue is filled once by the scan and closed;
//! the batch queue closes when the last parser exits, which in turn lets the
//! writers drain and exit.

mod parse_worker;
mod write_worker;

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::IngestConfig;
use crate::error::{IngestError, Result, StoreResult};
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::progress::FileProgress;
use crate::record::Batch;
use crate::scanner::Scanner;
use crate::source::FileTask;
use crate::stats::{IngestStats, RunSummary};
use crate::store::DocumentStore;

/// Field carrying the record fingerprint; unique per collection
pub const HASH_FIELD: &str = "hash";

/// State shared by every worker of one run
pub(crate) struct Shared {
    pub config: IngestConfig,
    pub store: Arc<dyn DocumentStore>,
    pub ledger: Ledger,
    pub stats: IngestStats,
    pub progress: FileProgress,
    indexed: StdMutex<HashSet<String>>,
}

impl Shared {
    /// Ensure the unique fingerprint index once per collection per run
    pub async fn ensure_hash_index(&self, collection: &str) -> StoreResult<()> {
        let known = self
            .indexed
            .lock()
            .map(|set| set.contains(collection))
            .unwrap_or(false);
        if known {
            return Ok(());
        }

        let store: &dyn DocumentStore = self.store.as_ref();
        with_retry(&self.config, "create_index", move || {
            store.create_index(collection, HASH_FIELD, true)
        })
        .await?;

        if let Ok(mut set) = self.indexed.lock() {
            set.insert(collection.to_string());
        }
        Ok(())
    }
}

/// Run `op` again on [`StoreError::Unavailable`](crate::error::StoreError)
/// with exponential backoff, up to `store_max_retries` extra attempts
pub(crate) async fn with_retry<T, F, Fut>(
    config: &IngestConfig,
    operation: &str,
    mut op: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.store_max_retries => {
                attempt += 1;
                let delay = config.retry_delay(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store unavailable, retrying"
                );
                tokio::time::sleep(delay).await;
            },
            Err(e) => return Err(e),
        }
    }
}

/// One configured ingestion pipeline over a document store
pub struct Pipeline {
    config: IngestConfig,
    store: Arc<dyn DocumentStore>,
}

impl Pipeline {
    pub fn new(config: IngestConfig, store: Arc<dyn DocumentStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, store })
    }

    /// Ingest everything under `root` and wait for the run to finish
    pub async fn run(&self, root: impl AsRef<Path>) -> Result<RunSummary> {
        self.run_until(root, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), stopping early once `cancel` fires: parsers
    /// take no further tasks, in-flight files finish and queued batches are
    /// written before the workers are joined.
    pub async fn run_until(
        &self,
        root: impl AsRef<Path>,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let root = root.as_ref().to_path_buf();
        let ledger = Ledger::new(self.store.clone());
        let stats = IngestStats::new();

        let snapshot = if self.config.overwrite {
            LedgerSnapshot::new()
        } else {
            let ledger = &ledger;
            with_retry(&self.config, "ledger_read", move || ledger.snapshot()).await?
        };

        let scanner = Scanner::new(self.config.traits.clone(), self.config.overwrite);
        let scan_root = root.clone();
        let report = tokio::task::spawn_blocking(move || scanner.scan(&scan_root, &snapshot))
            .await
            .map_err(|e| IngestError::Worker(format!("scanner: {}", e)))??;

        stats.record_scan_errors(report.errors);
        info!(
            root = %root.display(),
            discovered = report.discovered,
            filtered_out = report.filtered_out,
            already_ingested = report.already_ingested,
            queued = report.tasks.len(),
            "Scan complete"
        );

        if report.is_empty() {
            info!("Nothing to do");
            stats.mark_nothing_to_do();
            return Ok(stats.snapshot());
        }

        let tasks = report.tasks;
        stats.record_queued(tasks.len());
        let progress = FileProgress::new(tasks.len() as u64, self.config.show_progress);

        let (task_tx, task_rx) = mpsc::channel::<FileTask>(tasks.len());
        for task in tasks {
            task_tx
                .send(task)
                .await
                .map_err(|_| IngestError::Worker("task queue closed during fill".to_string()))?;
        }
        drop(task_tx);

        let shared = Arc::new(Shared {
            config: self.config.clone(),
            store: self.store.clone(),
            ledger,
            stats,
            progress,
            indexed: StdMutex::new(HashSet::new()),
        });

        let task_rx = Arc::new(Mutex::new(task_rx));
        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(self.config.batch_queue_capacity);
        let batch_rx = Arc::new(Mutex::new(batch_rx));

        let mut parsers: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.parser_workers);
        for id in 0..self.config.parser_workers {
            let worker = parse_worker::run(
                task_rx.clone(),
                batch_tx.clone(),
                shared.clone(),
                cancel.clone(),
            );
            parsers.push(tokio::spawn(worker.instrument(info_span!("parser", worker = id))));
        }
        // Only parser clones keep the batch queue open now
        drop(batch_tx);

        let mut writers: Vec<JoinHandle<()>> = Vec::with_capacity(self.config.writer_workers);
        for id in 0..self.config.writer_workers {
            let worker = write_worker::run(batch_rx.clone(), shared.clone());
            writers.push(tokio::spawn(worker.instrument(info_span!("writer", worker = id))));
        }

        for (id, handle) in parsers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker = id, error = %e, "Parser worker crashed");
            }
        }
        for (id, handle) in writers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker = id, error = %e, "Writer worker crashed");
            }
        }

        let mut abandoned = 0;
        {
            let mut rx = task_rx.lock().await;
            while rx.try_recv().is_ok() {
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            warn!(files = abandoned, "Run stopped before every file was taken");
            shared.stats.record_abandoned(abandoned);
        }
        if cancel.is_cancelled() {
            shared.stats.mark_stopped_early();
        }

        let summary = shared.stats.snapshot();
        shared.progress.finish("Ingestion finished");
        info!(
            files_written = summary.files_written,
            files_failed = summary.files_failed,
            files_abandoned = summary.files_abandoned,
            rows_written = summary.rows_written,
            rows_duplicate = summary.rows_duplicate,
            elapsed_ms = summary.elapsed_ms,
            "Ingestion run complete"
        );

        Ok(summary)
    }
}
