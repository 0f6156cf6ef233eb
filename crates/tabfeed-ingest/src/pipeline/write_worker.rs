//! Writer worker loop

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use super::{with_retry, Shared};
use crate::config::LedgerPolicy;
use crate::error::{IngestError, Result};
use crate::ledger::{Ledger, LedgerEntry};
use crate::record::Batch;
use crate::store::{DocumentStore, InsertOutcome};

/// Write batches until every parser has exited and the queue is drained
pub(super) async fn run(batches: Arc<Mutex<mpsc::Receiver<Batch>>>, shared: Arc<Shared>) {
    loop {
        let batch = batches.lock().await.recv().await;
        let Some(batch) = batch else {
            break;
        };

        write(&batch, &shared).await;
        shared.progress.file_done();
    }
}

async fn write(batch: &Batch, shared: &Shared) {
    let inserted = if batch.is_empty() {
        Ok(InsertOutcome::default())
    } else {
        let documents = batch.documents();
        let documents = documents.as_slice();
        let collection = batch.collection.as_str();
        let store: &dyn DocumentStore = shared.store.as_ref();
        with_retry(&shared.config, "insert", move || store.create(collection, documents)).await
    };

    match inserted {
        Ok(outcome) => {
            let entry = LedgerEntry::for_batch(batch, outcome);
            match append(&entry, shared).await {
                Ok(()) => {
                    info!(
                        file = %batch.filename,
                        collection = %batch.collection,
                        inserted = outcome.inserted,
                        duplicates = outcome.duplicates,
                        "Ingested"
                    );
                    shared.stats.record_written(outcome);
                },
                Err(e) => {
                    error!(
                        file = %batch.filename,
                        collection = %batch.collection,
                        inserted = outcome.inserted,
                        duplicates = outcome.duplicates,
                        kind = e.kind().as_str(),
                        error = %e,
                        "Records written but ledger append failed"
                    );
                    shared.stats.record_rows(outcome);
                    shared.stats.record_failure(&e);
                },
            }
        },
        Err(e) => {
            let err = IngestError::from(e);
            shared.stats.record_failure(&err);

            match shared.config.ledger_policy {
                LedgerPolicy::OnSuccess => {
                    error!(
                        file = %batch.filename,
                        kind = err.kind().as_str(),
                        error = %err,
                        "Bulk insert failed, file left out of the ledger"
                    );
                },
                LedgerPolicy::Always => {
                    warn!(
                        file = %batch.filename,
                        error = %err,
                        "Bulk insert failed, recording file as ingested anyway"
                    );
                    let entry = LedgerEntry::for_batch(batch, InsertOutcome::default());
                    if let Err(e) = append(&entry, shared).await {
                        error!(file = %batch.filename, error = %e, "Ledger append failed");
                    }
                },
            }
        },
    }
}

async fn append(entry: &LedgerEntry, shared: &Shared) -> Result<()> {
    let ledger: &Ledger = &shared.ledger;
    with_retry(&shared.config, "ledger_append", move || ledger.append(entry)).await?;
    Ok(())
}
