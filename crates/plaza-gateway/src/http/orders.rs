//! Business-side order endpoints: read, status PATCH, delivery-price PATCH.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use plaza_core::types::OrderStatus;
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::{authenticate, target_business};
use crate::http::{bad_request, domain_error, ok, ApiResult};

const DEFAULT_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct OrdersQuery {
    pub business_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<OrdersQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;
    let status = match query.status.as_deref() {
        Some(raw) => {
            Some(OrderStatus::from_str(raw).map_err(|e| bad_request("INVALID_STATUS", &e))?)
        }
        None => None,
    };
    let orders = state
        .stores
        .orders
        .list_for_business(&business_id, status, query.limit.unwrap_or(DEFAULT_LIMIT))
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(orders)))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let order = state
        .stores
        .orders
        .get(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?
        .ok_or_else(|| domain_error("ORDER_NOT_FOUND", "no such order"))?;
    target_business(&caller, Some(&order.business_id))?;
    let items = state
        .stores
        .orders
        .items_of(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    let history = state
        .stores
        .orders
        .history_of(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!({ "order": order, "items": items, "history": history })))
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
    let order = state
        .stores
        .orders
        .get(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?
        .ok_or_else(|| domain_error("ORDER_NOT_FOUND", "no such order"))?;
    target_business(&caller, Some(&order.business_id))?;

    let to = OrderStatus::from_str(&body.status)
        .map_err(|e| bad_request("INVALID_STATUS", &e))?;
    let updated = state
        .stores
        .orders
        .update_status(&id, to, &caller.id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(updated)))
}

#[derive(Deserialize)]
pub struct UpdateDeliveryPrice {
    pub delivery_price: f64,
}

pub async fn update_delivery_price(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateDeliveryPrice>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let order = state
        .stores
        .orders
        .get(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?
        .ok_or_else(|| domain_error("ORDER_NOT_FOUND", "no such order"))?;
    target_business(&caller, Some(&order.business_id))?;

    if body.delivery_price < 0.0 {
        return Err(bad_request("INVALID_PRICE", "delivery_price must be >= 0"));
    }
    let updated = state
        .stores
        .orders
        .set_delivery_price(&id, body.delivery_price)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(updated)))
}
