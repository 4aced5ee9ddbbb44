use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::{authenticate, target_business};
use crate::http::{domain_error, ok, ApiResult};

#[derive(Deserialize)]
pub struct ScopeQuery {
    pub business_id: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;
    let addons = state
        .stores
        .addons
        .list_for_business(&business_id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(addons)))
}

#[derive(Deserialize)]
pub struct ToggleAddon {
    pub business_id: Option<String>,
    pub addon_key: String,
    pub active: bool,
    pub price_override: Option<f64>,
}

/// Toggling takes effect on the next turn: the engine re-reads the gate when
/// it assembles the tool catalog.
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ToggleAddon>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, body.business_id.as_deref())?;
    let addon = state
        .stores
        .addons
        .set_active(&business_id, &body.addon_key, body.active, body.price_override)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(addon)))
}
