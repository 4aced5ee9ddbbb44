//! Tenant CRUD, branch creation, integrations, and opening hours.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use plaza_catalog::types::OpeningHours;
use plaza_core::types::{BusinessType, Platform, PrincipalKind};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::{authenticate, require_admin, target_business};
use crate::http::{bad_request, domain_error, not_found, ok, ApiResult};

#[derive(Deserialize)]
pub struct BusinessQuery {
    pub business_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateBusiness {
    pub display_name: String,
    pub business_type: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBusiness>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    require_admin(&caller)?;
    let business_type = BusinessType::from_str(&body.business_type)
        .map_err(|e| bad_request("INVALID_BUSINESS_TYPE", &e))?;
    let principal = state
        .stores
        .identity
        .create_principal(
            PrincipalKind::BusinessOwner,
            &body.display_name,
            None,
            Some(business_type),
        )
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(principal)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BusinessQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;
    let business = state
        .stores
        .identity
        .require(&business_id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    let branches = state
        .stores
        .identity
        .list_branches(&business_id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!({ "business": business, "branches": branches })))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    target_business(&caller, Some(&id))?;
    match state.stores.identity.get(&id) {
        Ok(Some(p)) => Ok(ok(json!(p))),
        Ok(None) => Err(not_found("PRINCIPAL_NOT_FOUND", "no such business")),
        Err(e) => Err(domain_error(e.code(), &e.to_string())),
    }
}

#[derive(Deserialize)]
pub struct UpdateSettings {
    pub tz_offset_minutes: Option<i32>,
    pub default_cancel_hours: Option<i64>,
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateSettings>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, Some(&id))?;
    state
        .stores
        .identity
        .update_business_settings(&business_id, body.tz_offset_minutes, body.default_cancel_hours)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!({ "updated": true })))
}

#[derive(Deserialize)]
pub struct CreateBranch {
    pub business_id: Option<String>,
    pub display_name: String,
}

pub async fn create_branch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBranch>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, body.business_id.as_deref())?;
    let branch = state
        .stores
        .identity
        .create_principal(PrincipalKind::Branch, &body.display_name, Some(&business_id), None)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(branch)))
}

#[derive(Deserialize)]
pub struct UpsertIntegration {
    pub owner_user_id: Option<String>,
    pub platform: String,
    pub access_token: String,
    pub external_id: String,
}

pub async fn upsert_integration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpsertIntegration>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let owner_id = match body.owner_user_id {
        Some(id) => id,
        None => target_business(&caller, None)?,
    };
    // The owner must live under the caller's tenant (or caller is admin).
    let owner = state
        .stores
        .identity
        .require(&owner_id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    if !caller.kind.is_admin() {
        target_business(&caller, owner.business_id())?;
    }
    let platform = Platform::from_str(&body.platform)
        .map_err(|e| bad_request("UNKNOWN_PLATFORM", &e))?;
    let integration = state
        .stores
        .identity
        .upsert_integration(&owner_id, platform, &body.access_token, &body.external_id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!({ "integration_id": integration.id })))
}

#[derive(Deserialize)]
pub struct HoursQuery {
    pub owner_id: Option<String>,
    pub business_id: Option<String>,
}

pub async fn list_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<HoursQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;
    let owner_id = query.owner_id.unwrap_or_else(|| business_id.clone());
    let hours = state
        .stores
        .catalog
        .list_opening_hours(&owner_id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(hours)))
}

#[derive(Deserialize)]
pub struct PutHours {
    pub business_id: Option<String>,
    pub owner_id: Option<String>,
    pub hours: Vec<HoursRow>,
}

#[derive(Deserialize)]
pub struct HoursRow {
    pub day_of_week: u8,
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    #[serde(default)]
    pub is_closed: bool,
    pub last_order_time: Option<String>,
}

pub async fn put_hours(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PutHours>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, body.business_id.as_deref())?;
    let owner_id = body.owner_id.unwrap_or_else(|| business_id.clone());
    for row in &body.hours {
        if row.day_of_week > 6 {
            return Err(bad_request("INVALID_DAY", "day_of_week must be 0..=6"));
        }
        state
            .stores
            .catalog
            .upsert_opening_hours(&OpeningHours {
                owner_id: owner_id.clone(),
                day_of_week: row.day_of_week,
                open_time: row.open_time.clone(),
                close_time: row.close_time.clone(),
                is_closed: row.is_closed,
                last_order_time: row.last_order_time.clone(),
            })
            .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    }
    Ok(ok(json!({ "updated": body.hours.len() })))
}
