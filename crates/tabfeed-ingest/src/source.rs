//! Source files and the routing metadata encoded in their names
//!
//! Names follow `OWNER{d}COLLECTION{d}SYSTEM{d}TIMESTAMP.EXT`, where `{d}` is
//! the configured delimiter and TIMESTAMP is `YYYY.MM.DD.HH.MM.SS`.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

/// strptime-style pattern of the timestamp segment
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d.%H.%M.%S";

const NAME_SEGMENTS: usize = 4;

/// One file selected by the scanner, consumed by exactly one parser worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    pub basename: String,
}

impl FileTask {
    /// Returns `None` for paths without a UTF-8 file name
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let basename = path.file_name()?.to_str()?.to_string();
        Some(Self { path, basename })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Routing metadata parsed from a file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    pub owner: String,
    pub collection: String,
    pub system: String,
    pub timestamp: NaiveDateTime,
}

impl SourceName {
    /// Parse a basename split by `delimiter` into exactly four segments
    pub fn parse(basename: &str, delimiter: &str) -> Result<Self> {
        let parts: Vec<&str> = basename.split(delimiter).collect();
        if parts.len() != NAME_SEGMENTS {
            return Err(IngestError::format(
                basename,
                format!(
                    "expected {} segments separated by '{}', found {}",
                    NAME_SEGMENTS,
                    delimiter,
                    parts.len()
                ),
            ));
        }

        let timestamp = parse_timestamp(parts[3]).ok_or_else(|| {
            IngestError::format(
                basename,
                format!("timestamp '{}' does not match YYYY.MM.DD.HH.MM.SS", parts[3]),
            )
        })?;

        Ok(Self {
            owner: parts[0].to_string(),
            collection: parts[1].to_string(),
            system: parts[2].to_string(),
            timestamp,
        })
    }
}

/// The segment normally carries the file extension; try it bare first.
fn parse_timestamp(segment: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(segment, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            let (stem, _ext) = segment.rsplit_once('.')?;
            NaiveDateTime::parse_from_str(stem, TIMESTAMP_FORMAT).ok()
        })
}
