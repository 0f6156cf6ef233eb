//! Tabfeed Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the tabfeed workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Checksums**: MD5 digests and the per-line record fingerprint
//!
//! # Example
//!
//! ```no_run
//! use tabfeed_common::checksum::fingerprint;
//!
//! let hash = fingerprint(&["east", "100"], "ACME_Sales_Prod_2021.03.30.01.05.08.csv");
//! assert_eq!(hash.len(), 32);
//! ```

pub mod checksum;
pub mod logging;

pub use checksum::{compute_md5, fingerprint};
