//! Selector listing and renaming.

use super::common::read_json;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use promhub_core::{KeyValue, KvKind};
use serde::{Deserialize, Serialize};

/// Request body for `POST /v1/selectors`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenameSelectorRequest {
    #[serde(default)]
    pub old_key: String,
    #[serde(default)]
    pub old_value: String,
    #[serde(default)]
    pub new_key: String,
    #[serde(default)]
    pub new_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorListResponse {
    pub selectors: Vec<KeyValue>,
}

/// GET /v1/selectors - List every selector pair.
pub async fn list_selectors(
    State(state): State<AppState>,
) -> ApiResult<Json<SelectorListResponse>> {
    let selectors = state.registry.list_selectors().await?;
    Ok(Json(SelectorListResponse { selectors }))
}

/// POST /v1/selectors - Rename a selector pair in place.
pub async fn rename_selector(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<KeyValue>> {
    let body: RenameSelectorRequest = read_json(req).await?;
    if [&body.old_key, &body.old_value, &body.new_key, &body.new_value]
        .iter()
        .any(|field| field.is_empty())
    {
        return Err(ApiError::BadRequest(
            "old_key, old_value, new_key and new_value are required".to_string(),
        ));
    }

    let old = KeyValue::new(body.old_key, body.old_value);
    let new = KeyValue::new(body.new_key, body.new_value);
    old.validate(KvKind::Selector)?;
    new.validate(KvKind::Selector)?;

    state.registry.rename_selector(&old, &new).await?;
    Ok(Json(new))
}
