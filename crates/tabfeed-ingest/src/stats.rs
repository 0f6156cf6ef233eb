//! Run statistics shared by every worker
//!
//! Counters are plain atomics; a [`RunSummary`] is a point-in-time copy.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::error::{FailureKind, IngestError};
use crate::store::InsertOutcome;

#[derive(Debug, Default)]
struct FailureCounters {
    scan: AtomicU64,
    format: AtomicU64,
    io: AtomicU64,
    store: AtomicU64,
    other: AtomicU64,
}

impl FailureCounters {
    fn counter(&self, kind: FailureKind) -> &AtomicU64 {
        match kind {
            FailureKind::Scan => &self.scan,
            FailureKind::Format => &self.format,
            FailureKind::Io => &self.io,
            FailureKind::Store => &self.store,
            FailureKind::Other => &self.other,
        }
    }
}

/// Failure counts by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureSummary {
    pub scan: u64,
    pub format: u64,
    pub io: u64,
    pub store: u64,
    pub other: u64,
}

impl FailureSummary {
    pub fn total(&self) -> u64 {
        self.scan + self.format + self.io + self.store + self.other
    }

    pub fn get(&self, kind: FailureKind) -> u64 {
        match kind {
            FailureKind::Scan => self.scan,
            FailureKind::Format => self.format,
            FailureKind::Io => self.io,
            FailureKind::Store => self.store,
            FailureKind::Other => self.other,
        }
    }
}

/// Snapshot of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_queued: u64,
    pub files_parsed: u64,
    pub files_written: u64,
    /// Files that failed parsing or writing
    pub files_failed: u64,
    /// Queued files never taken by a parser because the run was stopped
    pub files_abandoned: u64,
    pub failures: FailureSummary,
    pub rows_parsed: u64,
    pub rows_written: u64,
    pub rows_duplicate: u64,
    pub elapsed_ms: u64,
    pub nothing_to_do: bool,
    pub stopped_early: bool,
}

impl RunSummary {
    pub fn files_finished(&self) -> u64 {
        self.files_written + self.files_failed
    }
}

/// Aggregator fed by scanner, parser and writer workers
#[derive(Debug)]
pub struct IngestStats {
    started: Instant,
    files_queued: AtomicU64,
    files_parsed: AtomicU64,
    files_written: AtomicU64,
    files_failed: AtomicU64,
    files_abandoned: AtomicU64,
    failures: FailureCounters,
    rows_parsed: AtomicU64,
    rows_written: AtomicU64,
    rows_duplicate: AtomicU64,
    nothing_to_do: AtomicBool,
    stopped_early: AtomicBool,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            files_queued: AtomicU64::new(0),
            files_parsed: AtomicU64::new(0),
            files_written: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            files_abandoned: AtomicU64::new(0),
            failures: FailureCounters::default(),
            rows_parsed: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            rows_duplicate: AtomicU64::new(0),
            nothing_to_do: AtomicBool::new(false),
            stopped_early: AtomicBool::new(false),
        }
    }

    pub fn record_queued(&self, files: usize) {
        self.files_queued.fetch_add(files as u64, Ordering::Relaxed);
    }

    /// Walk entries skipped by the scanner; not counted as failed files
    pub fn record_scan_errors(&self, errors: usize) {
        self.failures
            .scan
            .fetch_add(errors as u64, Ordering::Relaxed);
    }

    pub fn record_parsed(&self, rows: usize) {
        self.files_parsed.fetch_add(1, Ordering::Relaxed);
        self.rows_parsed.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_written(&self, outcome: InsertOutcome) {
        self.files_written.fetch_add(1, Ordering::Relaxed);
        self.record_rows(outcome);
    }

    /// Rows that reached the store, whether or not their file made it into
    /// the ledger
    pub fn record_rows(&self, outcome: InsertOutcome) {
        self.rows_written
            .fetch_add(outcome.inserted, Ordering::Relaxed);
        self.rows_duplicate
            .fetch_add(outcome.duplicates, Ordering::Relaxed);
    }

    /// One file dropped by a parser or writer
    pub fn record_failure(&self, error: &IngestError) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
        self.failures
            .counter(error.kind())
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self, files: usize) {
        self.files_abandoned
            .fetch_add(files as u64, Ordering::Relaxed);
    }

    pub fn mark_nothing_to_do(&self) {
        self.nothing_to_do.store(true, Ordering::Relaxed);
    }

    pub fn mark_stopped_early(&self) {
        self.stopped_early.store(true, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunSummary {
            files_queued: load(&self.files_queued),
            files_parsed: load(&self.files_parsed),
            files_written: load(&self.files_written),
            files_failed: load(&self.files_failed),
            files_abandoned: load(&self.files_abandoned),
            failures: FailureSummary {
                scan: load(&self.failures.scan),
                format: load(&self.failures.format),
                io: load(&self.failures.io),
                store: load(&self.failures.store),
                other: load(&self.failures.other),
            },
            rows_parsed: load(&self.rows_parsed),
            rows_written: load(&self.rows_written),
            rows_duplicate: load(&self.rows_duplicate),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            nothing_to_do: self.nothing_to_do.load(Ordering::Relaxed),
            stopped_early: self.stopped_early.load(Ordering::Relaxed),
        }
    }
}
