//! Ingestion run configuration
//!
//! One [`IngestConfig`] is fixed for the whole run and shared read-only by
//! every worker.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_DELIMITER: &str = "_";
pub const DEFAULT_SEPARATOR: &str = ",";
pub const DEFAULT_PARSER_WORKERS: usize = 3;
pub const DEFAULT_WRITER_WORKERS: usize = 3;
/// Batches waiting for a writer before parsers block
pub const DEFAULT_BATCH_QUEUE_CAPACITY: usize = 8;
pub const DEFAULT_STORE_MAX_RETRIES: u32 = 3;
pub const DEFAULT_STORE_RETRY_BASE_MS: u64 = 250;

/// When a written file is recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerPolicy {
    /// Only after the bulk insert returned successfully
    #[default]
    OnSuccess,
    /// After every insert attempt, even one that failed outright
    Always,
}

impl std::str::FromStr for LedgerPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "on_success" | "success" => Ok(LedgerPolicy::OnSuccess),
            "always" => Ok(LedgerPolicy::Always),
            _ => Err(IngestError::config(format!("Invalid ledger policy: {}", s))),
        }
    }
}

/// Configuration for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Separates OWNER, COLLECTION, SYSTEM and TIMESTAMP in file names
    pub delimiter: String,
    /// Separates fields inside a line
    pub separator: String,
    /// Header row starts with a marker column that is not a data column
    pub ignore_first_header: bool,
    /// Re-ingest files already present in the ledger
    pub overwrite: bool,
    /// Substrings that must all appear in a file path
    pub traits: Vec<String>,
    pub parser_workers: usize,
    pub writer_workers: usize,
    pub batch_queue_capacity: usize,
    pub ledger_policy: LedgerPolicy,
    /// Retries for store calls failing with a connection-level error
    pub store_max_retries: u32,
    /// First retry delay; doubled on every further attempt
    pub store_retry_base_ms: u64,
    pub show_progress: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
            ignore_first_header: false,
            overwrite: false,
            traits: Vec::new(),
            parser_workers: DEFAULT_PARSER_WORKERS,
            writer_workers: DEFAULT_WRITER_WORKERS,
            batch_queue_capacity: DEFAULT_BATCH_QUEUE_CAPACITY,
            ledger_policy: LedgerPolicy::OnSuccess,
            store_max_retries: DEFAULT_STORE_MAX_RETRIES,
            store_retry_base_ms: DEFAULT_STORE_RETRY_BASE_MS,
            show_progress: false,
        }
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.delimiter.is_empty() {
            return Err(IngestError::config("delimiter must not be empty"));
        }
        if self.separator.is_empty() {
            return Err(IngestError::config("separator must not be empty"));
        }
        if self.parser_workers == 0 {
            return Err(IngestError::config("parser_workers must be greater than 0"));
        }
        if self.writer_workers == 0 {
            return Err(IngestError::config("writer_workers must be greater than 0"));
        }
        if self.batch_queue_capacity == 0 {
            return Err(IngestError::config("batch_queue_capacity must be greater than 0"));
        }
        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.store_retry_base_ms.saturating_mul(factor))
    }
}

/// Builder for IngestConfig
#[derive(Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.delimiter = delimiter.into();
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.config.separator = separator.into();
        self
    }

    pub fn ignore_first_header(mut self, ignore: bool) -> Self {
        self.config.ignore_first_header = ignore;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    pub fn traits<I, S>(mut self, traits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.traits = traits.into_iter().map(Into::into).collect();
        self
    }

    pub fn parser_workers(mut self, workers: usize) -> Self {
        self.config.parser_workers = workers;
        self
    }

    pub fn writer_workers(mut self, workers: usize) -> Self {
        self.config.writer_workers = workers;
        self
    }

    pub fn batch_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.batch_queue_capacity = capacity;
        self
    }

    pub fn ledger_policy(mut self, policy: LedgerPolicy) -> Self {
        self.config.ledger_policy = policy;
        self
    }

    pub fn store_retries(mut self, max_retries: u32, base_ms: u64) -> Self {
        self.config.store_max_retries = max_retries;
        self.config.store_retry_base_ms = base_ms;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<IngestConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.delimiter, "_");
        assert_eq!(config.separator, ",");
        assert_eq!(config.parser_workers, 3);
        assert_eq!(config.writer_workers, 3);
        assert_eq!(config.ledger_policy, LedgerPolicy::OnSuccess);
        assert!(!config.overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_rejects_invalid_values() {
        assert!(IngestConfig::builder().delimiter("").build().is_err());
        assert!(IngestConfig::builder().separator("").build().is_err());
        assert!(IngestConfig::builder().parser_workers(0).build().is_err());
        assert!(IngestConfig::builder().writer_workers(0).build().is_err());
        assert!(IngestConfig::builder().batch_queue_capacity(0).build().is_err());
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = IngestConfig::builder()
            .delimiter("-")
            .separator("|")
            .ignore_first_header(true)
            .overwrite(true)
            .traits([".dat", "2021"])
            .ledger_policy(LedgerPolicy::Always)
            .build()
            .unwrap();

        assert_eq!(config.delimiter, "-");
        assert_eq!(config.separator, "|");
        assert!(config.ignore_first_header);
        assert!(config.overwrite);
        assert_eq!(config.traits, vec![".dat".to_string(), "2021".to_string()]);
        assert_eq!(config.ledger_policy, LedgerPolicy::Always);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: IngestConfig =
            serde_json::from_str(r#"{"separator": ";", "ledger_policy": "always"}"#).unwrap();
        assert_eq!(config.separator, ";");
        assert_eq!(config.delimiter, "_");
        assert_eq!(config.ledger_policy, LedgerPolicy::Always);
    }

    #[test]
    fn test_ledger_policy_from_str() {
        assert_eq!("on-success".parse::<LedgerPolicy>().unwrap(), LedgerPolicy::OnSuccess);
        assert_eq!("ALWAYS".parse::<LedgerPolicy>().unwrap(), LedgerPolicy::Always);
        assert!("sometimes".parse::<LedgerPolicy>().is_err());
    }

    #[test]
    fn test_retry_delay_doubles() {
        let config = IngestConfig::builder().store_retries(3, 100).build().unwrap();
        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(400));
    }
}
