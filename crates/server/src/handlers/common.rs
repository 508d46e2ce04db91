//! Shared request and response helpers.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use promhub_core::kv::pairs_to_map;
use promhub_core::{KvKind, TargetAuth};
use promhub_registry::models::TargetRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Maximum request body size for management endpoints (1 MiB).
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Read and decode a JSON request body, reporting failures in the API envelope.
pub async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Validate a `(key, value)` taken from the URL path.
pub fn path_pair(kind: KvKind, key: String, value: String) -> ApiResult<promhub_core::KeyValue> {
    let pair = promhub_core::KeyValue::new(key, value);
    pair.validate(kind)?;
    Ok(pair)
}

/// A target as returned by lookup, update and inventory.
#[derive(Debug, Clone, Serialize)]
pub struct TargetResponse {
    pub id: i64,
    pub schema: String,
    pub address: String,
    /// `schema://address`.
    pub endpoint: String,
    pub metric_path: String,
    pub scrape_interval: i64,
    pub scrape_timeout: i64,
    #[serde(skip_serializing_if = "TargetAuth::is_empty")]
    pub auth: TargetAuth,
    pub labels: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub selectors: BTreeMap<String, String>,
}

impl From<TargetRecord> for TargetResponse {
    fn from(record: TargetRecord) -> Self {
        let target = record.target;
        Self {
            id: target.id,
            endpoint: format!("{}://{}", target.scheme, target.address),
            schema: target.scheme,
            address: target.address,
            metric_path: target.metric_path,
            scrape_interval: target.scrape_interval_secs,
            scrape_timeout: target.scrape_timeout_secs,
            auth: TargetAuth {
                base: target.base_auth,
                bearer_token: target.bearer_token,
            },
            labels: pairs_to_map(&record.labels),
            params: pairs_to_map(&record.params),
            selectors: pairs_to_map(&record.selectors),
        }
    }
}
