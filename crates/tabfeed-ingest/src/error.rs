//! Error types for tabfeed ingestion
//!
//! File-level failures never abort a run. Each one is classified by
//! [`FailureKind`] and counted by the run statistics.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for document store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a [`DocumentStore`](crate::store::DocumentStore)
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached; the operation may succeed if retried
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Collection or field name the backend cannot address
    #[error("Invalid name '{0}'")]
    InvalidName(String),

    /// Unique index requested over values that are already duplicated
    #[error("Unique index on '{collection}.{field}' conflicts with existing documents")]
    Conflict { collection: String, field: String },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether retrying the same operation can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("Malformed document: {}", err))
    }
}

/// Main error type for the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    /// Directory walk failure
    #[error("Cannot scan '{path}': {message}")]
    Scan { path: PathBuf, message: String },

    /// File name or timestamp does not follow OWNER_COLLECTION_SYSTEM_TIMESTAMP.EXT
    #[error("Malformed source file '{file}': {reason}")]
    Format { file: String, reason: String },

    /// File unreadable mid-stream
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker task panicked or was aborted
    #[error("Worker failed: {0}")]
    Worker(String),
}

impl IngestError {
    pub fn format(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Scan { .. } => FailureKind::Scan,
            IngestError::Format { .. } => FailureKind::Format,
            IngestError::Io { .. } => FailureKind::Io,
            IngestError::Store(_) => FailureKind::Store,
            IngestError::Config(_) | IngestError::Worker(_) => FailureKind::Other,
        }
    }
}

/// Failure classification reported in run statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Scan,
    Format,
    Io,
    Store,
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Scan => "scan",
            FailureKind::Format => "format",
            FailureKind::Io => "io",
            FailureKind::Store => "store",
            FailureKind::Other => "other",
        }
    }
}
