use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::{authenticate, target_business};
use crate::http::{domain_error, ok, ApiResult};

#[derive(Deserialize)]
pub struct TablesQuery {
    pub business_id: Option<String>,
    pub owner_id: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TablesQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;
    let owner_id = query.owner_id.unwrap_or_else(|| business_id.clone());
    let tables = state
        .stores
        .catalog
        .list_tables(&owner_id, false)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(tables)))
}

#[derive(Deserialize)]
pub struct CreateTable {
    pub business_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub table_number: i64,
    pub min_seats: u32,
    pub max_seats: u32,
    pub position_label: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTable>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, body.business_id.as_deref())?;
    let owner_id = body.owner_user_id.unwrap_or_else(|| business_id.clone());
    let table = state
        .stores
        .catalog
        .create_table(
            &business_id,
            &owner_id,
            body.table_number,
            body.min_seats,
            body.max_seats,
            body.position_label.as_deref(),
        )
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(table)))
}

#[derive(Deserialize)]
pub struct UpdateTable {
    pub is_active: bool,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateTable>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let table = state
        .stores
        .catalog
        .get_table(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?
        .ok_or_else(|| domain_error("TABLE_NOT_FOUND", "no such table"))?;
    target_business(&caller, Some(&table.business_id))?;
    state
        .stores
        .catalog
        .set_table_active(&id, body.is_active)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!({ "updated": true })))
}
