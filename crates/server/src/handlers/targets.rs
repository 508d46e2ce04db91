//! Target registration, lookup, update and deletion.

use super::common::{TargetResponse, path_pair, read_json};
use crate::discovery::unique_by_fingerprint;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{TARGETS_CREATED, TARGETS_MERGED};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use promhub_core::kv::pairs_from_map;
use promhub_core::{KvKind, TargetAuth, TargetItem, TargetSpec};
use promhub_registry::models::{
    DeleteFilter, RegisterOutcome, SweepReport, TargetPatch, Visibility,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request body for `PUT /v1/targets`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    #[serde(default)]
    pub targets: Vec<TargetItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub created: usize,
    pub merged: usize,
    /// Resulting target id per submitted item, in request order.
    pub target_ids: Vec<i64>,
}

/// Request body for `POST /v1/targets/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub metric_path: Option<String>,
    #[serde(default, alias = "scrape_time")]
    pub scrape_interval: Option<i64>,
    #[serde(default)]
    pub scrape_timeout: Option<i64>,
    #[serde(default)]
    pub auth: Option<TargetAuth>,
}

/// Request body for `DELETE /v1/targets`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkDeleteRequest {
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub auth: Option<TargetAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

/// PUT /v1/targets - Register targets under a selector scope.
pub async fn register_targets(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<RegisterResponse>> {
    let body: RegisterRequest = read_json(req).await?;

    if body.selectors.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one selector is required".to_string(),
        ));
    }
    if body.targets.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one target is required".to_string(),
        ));
    }

    let selectors = pairs_from_map(KvKind::Selector, &body.selectors)?;
    let specs = body
        .targets
        .iter()
        .map(TargetSpec::from_item)
        .collect::<Result<Vec<_>, _>>()?;

    let outcomes = state.registry.register_targets(&selectors, &specs).await?;

    let created = outcomes
        .iter()
        .filter(|o| matches!(o, RegisterOutcome::Created(_)))
        .count();
    let merged = outcomes.len() - created;
    TARGETS_CREATED.inc_by(created as u64);
    TARGETS_MERGED.inc_by(merged as u64);

    tracing::info!(
        created = created,
        merged = merged,
        selectors = selectors.len(),
        "Targets registered"
    );

    Ok(Json(RegisterResponse {
        created,
        merged,
        target_ids: outcomes.iter().map(RegisterOutcome::target_id).collect(),
    }))
}

/// GET /v1/targets/{id} - Look up one live target.
pub async fn get_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<TargetResponse>> {
    let record = state
        .registry
        .get_target(id, Visibility::LiveOnly)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("target {id}")))?;
    Ok(Json(record.into()))
}

/// GET /v1/targets/inventory/{key}/{value} - Raw records for a selector.
///
/// Records sharing a fingerprint are listed once, lowest id first.
pub async fn list_inventory(
    State(state): State<AppState>,
    Path((key, value)): Path<(String, String)>,
) -> ApiResult<Json<Vec<TargetResponse>>> {
    let selector = path_pair(KvKind::Selector, key, value)?;
    let records = state
        .registry
        .list_by_selector(&selector, Visibility::LiveOnly)
        .await?;
    Ok(Json(
        unique_by_fingerprint(records)
            .into_iter()
            .map(TargetResponse::from)
            .collect(),
    ))
}

/// POST /v1/targets/{id} - Partial update.
pub async fn update_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    req: Request,
) -> ApiResult<Json<TargetResponse>> {
    let body: UpdateRequest = read_json(req).await?;
    let auth = body.auth.unwrap_or_default();
    let patch = TargetPatch {
        address: body.address,
        metric_path: body.metric_path,
        scrape_interval_secs: body.scrape_interval,
        scrape_timeout_secs: body.scrape_timeout,
        bearer_token: auth.bearer_token,
        base_auth: auth.base,
    };

    let record = state.registry.update_target(id, &patch).await?;
    Ok(Json(record.into()))
}

/// DELETE /v1/targets/{id} - Soft-delete one target.
pub async fn delete_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    state.registry.delete_target(id).await?;
    Ok(Json(DeleteResponse { deleted: 1 }))
}

/// DELETE /v1/targets/name/{name} - Soft-delete every target at an address.
pub async fn delete_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.registry.delete_by_address(&name).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// DELETE /v1/targets/label/{key}/{value} - Soft-delete targets carrying a label.
pub async fn delete_by_label(
    State(state): State<AppState>,
    Path((key, value)): Path<(String, String)>,
) -> ApiResult<Json<DeleteResponse>> {
    let label = path_pair(KvKind::Label, key, value)?;
    let deleted = state.registry.delete_by_label(&label).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// DELETE /v1/targets - Soft-delete by composite filter.
pub async fn delete_matching(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<DeleteResponse>> {
    let body: BulkDeleteRequest = read_json(req).await?;
    let auth = body.auth.unwrap_or_default();
    let filter = DeleteFilter {
        selectors: pairs_from_map(KvKind::Selector, &body.selectors)?,
        labels: pairs_from_map(KvKind::Label, &body.labels)?,
        address: body.address,
        bearer_token: auth.bearer_token,
        base_auth: auth.base,
    };
    if filter.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one of selectors, labels, address or auth is required".to_string(),
        ));
    }

    let deleted = state.registry.delete_matching(&filter).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// DELETE /v1/targets/clean - Purge tombstoned targets.
pub async fn sweep_targets(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    let report = state.registry.sweep_deleted().await?;
    Ok(Json(report))
}

