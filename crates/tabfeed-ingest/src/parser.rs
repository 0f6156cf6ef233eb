//! Source file parser
//!
//! Reads one file end to end and produces its [`Batch`]. Nothing leaves the
//! parser until the whole file has been read, so a read error mid-stream
//! never yields a partial batch.

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::record::{Batch, RecordBuilder};
use crate::source::{FileTask, SourceName};

/// Parses file names and contents with the run's delimiter settings
#[derive(Debug, Clone)]
pub struct FileParser {
    delimiter: String,
    separator: String,
    ignore_first_header: bool,
}

impl FileParser {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            delimiter: config.delimiter.clone(),
            separator: config.separator.clone(),
            ignore_first_header: config.ignore_first_header,
        }
    }

    pub fn parse_name(&self, task: &FileTask) -> Result<SourceName> {
        SourceName::parse(&task.basename, &self.delimiter)
    }

    /// Stream the file line by line into a batch for `source.collection`
    pub async fn parse_file(&self, task: &FileTask, source: &SourceName) -> Result<Batch> {
        let file = File::open(&task.path)
            .await
            .map_err(|e| IngestError::io(&task.path, e))?;
        let mut lines = BufReader::new(file).lines();

        let mut builder = RecordBuilder::new(
            source,
            &task.basename,
            &self.separator,
            self.ignore_first_header,
        );

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| IngestError::io(&task.path, e))?
        {
            builder.push_line(&line);
        }

        if builder.headers().is_none() {
            debug!(file = %task.basename, "File has no header row");
        }

        Ok(Batch {
            collection: source.collection.clone(),
            filename: task.basename.clone(),
            path: task.path.clone(),
            records: builder.finish(),
        })
    }
}
