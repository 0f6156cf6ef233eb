//! Directory scanner
//!
//! Walks the source tree once and selects the files still to ingest: every
//! trait must appear in the full path, and unless overwrite is requested the
//! basename must be absent from the ledger snapshot. Symbolic links are
//! followed; a link cycle is reported as a walk error for that entry.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{IngestError, Result};
use crate::ledger::LedgerSnapshot;
use crate::source::FileTask;

/// Outcome of one scan
#[derive(Debug, Default)]
pub struct ScanReport {
    pub tasks: Vec<FileTask>,
    /// Regular files seen
    pub discovered: usize,
    /// Dropped by the trait filter
    pub filtered_out: usize,
    /// Dropped because the ledger already lists them
    pub already_ingested: usize,
    /// Entries skipped after a walk error
    pub errors: usize,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    traits: Vec<String>,
    overwrite: bool,
}

impl Scanner {
    pub fn new(traits: Vec<String>, overwrite: bool) -> Self {
        Self { traits, overwrite }
    }

    /// Case-sensitive AND over every trait
    pub fn has_traits(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.traits.iter().all(|t| path.contains(t.as_str()))
    }

    /// Blocking walk of `root`; run it off the async executor
    pub fn scan(&self, root: &Path, snapshot: &LedgerSnapshot) -> Result<ScanReport> {
        if !root.is_dir() {
            return Err(IngestError::Scan {
                path: root.to_path_buf(),
                message: "not a readable directory".to_string(),
            });
        }

        let mut report = ScanReport::default();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(root));
                    warn!(path = %path.display(), error = %e, kind = "scan", "Skipping unreadable entry");
                    report.errors += 1;
                    continue;
                },
            };

            if !entry.file_type().is_file() {
                continue;
            }
            report.discovered += 1;

            if !self.has_traits(entry.path()) {
                report.filtered_out += 1;
                continue;
            }

            let Some(task) = FileTask::from_path(entry.path()) else {
                warn!(path = %entry.path().display(), kind = "scan", "Skipping file without a UTF-8 name");
                report.errors += 1;
                continue;
            };

            if !self.overwrite && snapshot.contains(&task.basename) {
                debug!(file = %task.basename, "Already ingested");
                report.already_ingested += 1;
                continue;
            }

            report.tasks.push(task);
        }

        Ok(report)
    }
}
