//! Core domain types and shared logic for promhub.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Scrape target descriptions and their normalization rules
//! - Key/value pairs for labels, params and selectors
//! - Content fingerprints used for target de-duplication
//! - Application configuration

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod kv;
pub mod target;

pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use kv::{KeyValue, KvKind};
pub use target::{Credentials, Scheme, TargetAuth, TargetItem, TargetSpec};

/// Metric path used when a target does not specify one.
pub const DEFAULT_METRIC_PATH: &str = "/metrics";

/// Scrape interval in seconds used when a target does not specify one.
pub const DEFAULT_SCRAPE_INTERVAL_SECS: i64 = 30;

/// Scrape timeout in seconds used when a target does not specify one.
pub const DEFAULT_SCRAPE_TIMEOUT_SECS: i64 = 10;
