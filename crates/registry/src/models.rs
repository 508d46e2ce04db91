//! Database models mapping to the registry schema.

use promhub_core::{Credentials, Fingerprint, KeyValue, Scheme};
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Targets
// =============================================================================

/// Target record.
#[derive(Debug, Clone, FromRow)]
pub struct TargetRow {
    pub id: i64,
    pub scheme: String,
    pub address: String,
    pub metric_path: String,
    pub scrape_interval_secs: i64,
    pub scrape_timeout_secs: i64,
    pub bearer_token: Option<String>,
    pub base_auth: Option<String>,
    pub deleted: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TargetRow {
    pub fn scheme(&self) -> Scheme {
        self.scheme.parse().unwrap_or_default()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::select(self.bearer_token.as_deref(), self.base_auth.as_deref())
    }
}

/// A target together with its associated pairs.
#[derive(Debug, Clone)]
pub struct TargetRecord {
    pub target: TargetRow,
    pub labels: Vec<KeyValue>,
    pub params: Vec<KeyValue>,
    pub selectors: Vec<KeyValue>,
}

impl TargetRecord {
    /// Fingerprint from the currently associated params.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(
            self.target.scheme(),
            &self.target.address,
            &self.target.metric_path,
            self.params.iter().map(|p| (p.key.as_str(), p.value.as_str())),
        )
    }
}

// =============================================================================
// Labels, params and selectors
// =============================================================================

/// A `(key, value)` row from one of the pair tables.
#[derive(Debug, Clone, FromRow)]
pub struct PairRow {
    pub id: i64,
    pub key: String,
    pub value: String,
}

/// A pair joined to the target that owns it.
#[derive(Debug, Clone, FromRow)]
pub struct TargetPairRow {
    pub target_id: i64,
    pub key: String,
    pub value: String,
}

// =============================================================================
// Operation inputs and outputs
// =============================================================================

/// Whether reads may return tombstoned targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    LiveOnly,
    IncludeDeleted,
}

/// Result of resolving one submitted target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created(i64),
    /// Matched an existing target by fingerprint; only associations were added.
    Merged(i64),
}

impl RegisterOutcome {
    pub fn target_id(&self) -> i64 {
        match self {
            Self::Created(id) | Self::Merged(id) => *id,
        }
    }
}

/// Partial update. `None` and empty values leave the field untouched.
#[derive(Debug, Clone, Default)]
pub struct TargetPatch {
    /// May carry an `http://` or `https://` prefix, which also updates the scheme.
    pub address: Option<String>,
    pub metric_path: Option<String>,
    pub scrape_interval_secs: Option<i64>,
    pub scrape_timeout_secs: Option<i64>,
    pub bearer_token: Option<String>,
    pub base_auth: Option<String>,
}

/// Composite filter for bulk soft-deletes.
///
/// Selectors match if any pair matches, likewise labels. The populated
/// criteria are combined with AND.
#[derive(Debug, Clone, Default)]
pub struct DeleteFilter {
    pub selectors: Vec<KeyValue>,
    pub labels: Vec<KeyValue>,
    pub address: Option<String>,
    pub bearer_token: Option<String>,
    pub base_auth: Option<String>,
}

impl DeleteFilter {
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
            && self.labels.is_empty()
            && self.address.as_deref().is_none_or(str::is_empty)
            && self.bearer_token.as_deref().is_none_or(str::is_empty)
            && self.base_auth.as_deref().is_none_or(str::is_empty)
    }
}

/// Counts removed by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub purged: u64,
    pub labels: u64,
    pub params: u64,
    pub selectors: u64,
}
