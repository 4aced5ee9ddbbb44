use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use plaza_core::types::{ReservationStatus, ReservationType};
use plaza_reservations::types::NewReservation;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::{authenticate, target_business};
use crate::http::{bad_request, domain_error, ok, ApiResult};

#[derive(Deserialize)]
pub struct ListQuery {
    pub business_id: Option<String>,
    pub from: String,
    pub to: String,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;
    let reservations = state
        .stores
        .reservations
        .list_range(&business_id, &query.from, &query.to)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(reservations)))
}

#[derive(Deserialize)]
pub struct CreateReservation {
    pub business_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub customer_phone_number: String,
    pub customer_name: Option<String>,
    pub reservation_date: String,
    pub reservation_time: String,
    pub number_of_guests: Option<u32>,
    pub reservation_type: Option<String>,
    pub table_number: Option<i64>,
    pub position_pref: Option<String>,
    pub notes: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateReservation>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, body.business_id.as_deref())?;
    let reservation_type = match body.reservation_type.as_deref() {
        Some(raw) => ReservationType::from_str(raw)
            .map_err(|e| bad_request("INVALID_RESERVATION_TYPE", &e))?,
        None => ReservationType::Table,
    };
    let reservation = state
        .stores
        .reservations
        .create(NewReservation {
            business_user_id: business_id.clone(),
            owner_user_id: body.owner_user_id.unwrap_or(business_id),
            customer_phone_number: body.customer_phone_number,
            customer_name: body.customer_name,
            reservation_date: body.reservation_date,
            reservation_time: body.reservation_time,
            number_of_guests: body.number_of_guests,
            reservation_type,
            table_number: body.table_number,
            position_pref: body.position_pref,
            notes: body.notes,
        })
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(reservation)))
}

#[derive(Deserialize)]
pub struct UpdateStatus {
    pub status: String,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatus>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let reservation = state
        .stores
        .reservations
        .get(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?
        .ok_or_else(|| domain_error("RESERVATION_NOT_FOUND", "no such reservation"))?;
    target_business(&caller, Some(&reservation.business_user_id))?;

    let to = ReservationStatus::from_str(&body.status)
        .map_err(|e| bad_request("INVALID_STATUS", &e))?;
    let updated = state
        .stores
        .reservations
        .update_status(&id, to)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(updated)))
}
