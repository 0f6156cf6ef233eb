//! Parser worker loop

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Shared;
use crate::error::{IngestError, Result};
use crate::parser::FileParser;
use crate::record::Batch;
use crate::source::FileTask;

/// Take tasks until the queue is empty or `cancel` fires. Each parsed file is
/// sent as one batch; sending waits while the batch queue is full.
pub(super) async fn run(
    tasks: Arc<Mutex<mpsc::Receiver<FileTask>>>,
    batches: mpsc::Sender<Batch>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let parser = FileParser::new(&shared.config);

    loop {
        let task = {
            let mut rx = tasks.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                task = rx.recv() => task,
            }
        };
        let Some(task) = task else {
            break;
        };

        match parse(&parser, &task, &shared).await {
            Ok(batch) => {
                debug!(file = %task.basename, rows = batch.len(), "Parsed");
                shared.stats.record_parsed(batch.len());
                if batches.send(batch).await.is_err() {
                    let err = IngestError::Worker("batch queue closed".to_string());
                    warn!(file = %task.basename, error = %err, "Dropping parsed file");
                    shared.stats.record_failure(&err);
                    shared.progress.file_done();
                    break;
                }
            },
            Err(e) => {
                warn!(
                    file = %task.path.display(),
                    kind = e.kind().as_str(),
                    error = %e,
                    "Skipping file"
                );
                shared.stats.record_failure(&e);
                shared.progress.file_done();
            },
        }
    }
}

async fn parse(parser: &FileParser, task: &FileTask, shared: &Shared) -> Result<Batch> {
    let source = parser.parse_name(task)?;
    shared.ensure_hash_index(&source.collection).await?;
    parser.parse_file(task, &source).await
}
