//! Prometheus HTTP service discovery endpoint.

use super::common::path_pair;
use crate::discovery::{TargetGroup, assemble};
use crate::error::ApiResult;
use crate::metrics::DISCOVERY_REQUESTS;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use promhub_core::KvKind;
use promhub_registry::models::Visibility;

/// GET /v1/targets/selector/{key}/{value} - Scrape groups for a selector.
pub async fn discover_targets(
    State(state): State<AppState>,
    Path((key, value)): Path<(String, String)>,
) -> ApiResult<Json<Vec<TargetGroup>>> {
    DISCOVERY_REQUESTS.inc();
    let selector = path_pair(KvKind::Selector, key, value)?;
    let records = state
        .registry
        .list_by_selector(&selector, Visibility::LiveOnly)
        .await?;
    let groups = assemble(&records, &state.proxy);

    tracing::debug!(
        selector = %selector,
        targets = records.len(),
        groups = groups.len(),
        "Discovery served"
    );
    Ok(Json(groups))
}
