//! Tabfeed Ingest - bulk loader for delimited export files

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tabfeed_common::logging::{init_logging, LogConfig, LogLevel};
use tabfeed_ingest::config::{
    DEFAULT_BATCH_QUEUE_CAPACITY, DEFAULT_DELIMITER, DEFAULT_PARSER_WORKERS, DEFAULT_SEPARATOR,
    DEFAULT_WRITER_WORKERS,
};
use tabfeed_ingest::{DocumentStore, IngestConfig, LedgerPolicy, MemoryStore, Pipeline, SqliteStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tabfeed-ingest")]
#[command(author, version, about = "Load delimited export files into a document store")]
struct Cli {
    /// Directory to scan for source files
    #[arg(env = "TABFEED_SRC")]
    src: PathBuf,

    /// Separates OWNER, COLLECTION, SYSTEM and TIMESTAMP in file names
    #[arg(long, env = "TABFEED_DELIMITER", default_value = DEFAULT_DELIMITER)]
    delimiter: String,

    /// Field separator inside a line
    #[arg(long, env = "TABFEED_SEPARATOR", default_value = DEFAULT_SEPARATOR)]
    separator: String,

    /// Substring every ingested path must contain (repeatable)
    #[arg(long = "trait", value_name = "TRAIT")]
    traits: Vec<String>,

    /// Drop the first header token (a marker column)
    #[arg(long, env = "TABFEED_IGNORE_FIRST_HEADER")]
    ignore_first_header: bool,

    /// Re-ingest files already recorded in the ledger
    #[arg(long, env = "TABFEED_OVERWRITE")]
    overwrite: bool,

    /// Parser workers
    #[arg(long, env = "TABFEED_PARSERS", default_value_t = DEFAULT_PARSER_WORKERS)]
    parsers: usize,

    /// Writer workers
    #[arg(long, env = "TABFEED_WRITERS", default_value_t = DEFAULT_WRITER_WORKERS)]
    writers: usize,

    /// Parsed files allowed to wait for a writer
    #[arg(long, env = "TABFEED_QUEUE_CAPACITY", default_value_t = DEFAULT_BATCH_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// When a file is recorded in the ledger (on-success, always)
    #[arg(long, env = "TABFEED_LEDGER_POLICY", default_value = "on-success")]
    ledger_policy: LedgerPolicy,

    /// `memory` or a SQLite URL such as `sqlite:tabfeed.db`
    #[arg(long, env = "TABFEED_DATABASE", default_value = "sqlite:tabfeed.db")]
    database: String,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn ingest_config(&self) -> Result<IngestConfig> {
        let config = IngestConfig::builder()
            .delimiter(self.delimiter.clone())
            .separator(self.separator.clone())
            .traits(self.traits.clone())
            .ignore_first_header(self.ignore_first_header)
            .overwrite(self.overwrite)
            .parser_workers(self.parsers)
            .writer_workers(self.writers)
            .batch_queue_capacity(self.queue_capacity)
            .ledger_policy(self.ledger_policy)
            .show_progress(self.progress)
            .build()?;
        Ok(config)
    }
}

async fn open_store(database: &str) -> Result<Arc<dyn DocumentStore>> {
    if database.eq_ignore_ascii_case("memory") {
        warn!("Using an in-memory store; nothing outlives this run");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = SqliteStore::connect(database)
        .await
        .with_context(|| format!("Failed to open database '{}'", database))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("tabfeed-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = cli.ingest_config()?;
    let store = open_store(&cli.database).await?;
    let pipeline = Pipeline::new(config, store)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight files");
            interrupt.cancel();
        }
    });

    info!(src = %cli.src.display(), database = %cli.database, "Starting ingestion");
    let summary = pipeline
        .run_until(&cli.src, cancel)
        .await
        .with_context(|| format!("Ingestion of '{}' failed", cli.src.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if summary.nothing_to_do {
        info!("No new files to ingest");
    }

    Ok(())
}
