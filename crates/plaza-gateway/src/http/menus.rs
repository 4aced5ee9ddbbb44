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
    let menus = state
        .stores
        .catalog
        .list_menus(&business_id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(menus)))
}

#[derive(Deserialize)]
pub struct CreateMenu {
    pub business_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub name: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateMenu>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, body.business_id.as_deref())?;
    let menu = state
        .stores
        .catalog
        .create_menu(&business_id, body.owner_user_id.as_deref(), &body.name)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(menu)))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;
    let categories = state
        .stores
        .catalog
        .list_categories(&business_id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(categories)))
}

#[derive(Deserialize)]
pub struct CreateCategory {
    pub business_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateCategory>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, body.business_id.as_deref())?;
    let category = state
        .stores
        .catalog
        .create_category(&business_id, &body.name, body.description.as_deref())
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(category)))
}
