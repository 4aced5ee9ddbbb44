use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use plaza_core::types::TicketStatus;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::{authenticate, target_business};
use crate::http::{bad_request, domain_error, ok, ApiResult};

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
    let tickets = state
        .stores
        .tickets
        .list_open(&business_id, 100)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(tickets)))
}

#[derive(Deserialize)]
pub struct UpdateTicket {
    pub status: Option<String>,
    pub assigned_employee_id: Option<String>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateTicket>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let ticket = state
        .stores
        .tickets
        .get(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?
        .ok_or_else(|| domain_error("TICKET_NOT_FOUND", "no such ticket"))?;
    target_business(&caller, Some(&ticket.business_id))?;

    if let Some(employee_id) = body.assigned_employee_id.as_deref() {
        state
            .stores
            .tickets
            .assign(&id, employee_id)
            .map_err(|e| domain_error(e.code(), &e.to_string()))?;
        // Pickup also assigns the linked session, ending the handover queue wait.
        if let Some(session_id) = ticket.session_id.as_deref() {
            let _ = state.stores.sessions.assign_employee(session_id, employee_id);
        }
    }
    if let Some(raw) = body.status.as_deref() {
        let status =
            TicketStatus::from_str(raw).map_err(|e| bad_request("INVALID_STATUS", &e))?;
        state
            .stores
            .tickets
            .set_status(&id, status)
            .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    }
    Ok(ok(json!({ "updated": true })))
}
