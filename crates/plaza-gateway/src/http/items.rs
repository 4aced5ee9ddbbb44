//! Item CRUD for the admin surface.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use plaza_catalog::store::NewItem;
use plaza_core::types::{ItemAvailability, ItemType};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppState;
use crate::auth::{authenticate, target_business};
use crate::http::{bad_request, domain_error, ok, ApiResult};

#[derive(Deserialize)]
pub struct ItemsQuery {
    pub business_id: Option<String>,
    #[serde(default)]
    pub include_hidden: bool,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ItemsQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;
    let items = state
        .stores
        .catalog
        .list_items(&business_id, query.include_hidden)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(items)))
}

#[derive(Deserialize)]
pub struct CreateItem {
    pub business_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub menu_id: Option<String>,
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub item_type: Option<String>,
    pub price: f64,
    pub cost: Option<f64>,
    pub preparation_time_minutes: Option<i64>,
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub is_schedulable: bool,
    #[serde(default)]
    pub min_schedule_hours: i64,
    pub cancelable_before_hours: Option<i64>,
    pub stock_quantity: Option<i64>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateItem>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, body.business_id.as_deref())?;
    let item_type = match body.item_type.as_deref() {
        Some(raw) => ItemType::from_str(raw).map_err(|e| bad_request("INVALID_ITEM_TYPE", &e))?,
        None => ItemType::Good,
    };
    let mut new = NewItem::new(&business_id, &body.name, body.price);
    new.owner_user_id = body.owner_user_id;
    new.menu_id = body.menu_id;
    new.category_id = body.category_id;
    new.description = body.description;
    new.item_type = item_type;
    new.cost = body.cost;
    new.preparation_time_minutes = body.preparation_time_minutes;
    new.duration_minutes = body.duration_minutes;
    new.is_schedulable = body.is_schedulable;
    new.min_schedule_hours = body.min_schedule_hours;
    new.cancelable_before_hours = body.cancelable_before_hours;
    new.stock_quantity = body.stock_quantity;
    let item = state
        .stores
        .catalog
        .create_item(new)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!(item)))
}

#[derive(Deserialize)]
pub struct UpdateItem {
    pub price: Option<f64>,
    pub availability: Option<String>,
    pub availability_note: Option<String>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateItem>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let item = state
        .stores
        .catalog
        .get_item(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?
        .ok_or_else(|| domain_error("ITEM_NOT_FOUND", "no such item"))?;
    target_business(&caller, Some(&item.business_id))?;

    if let Some(price) = body.price {
        state
            .stores
            .catalog
            .set_item_price(&id, price)
            .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    }
    if let Some(raw) = body.availability.as_deref() {
        let availability = ItemAvailability::from_str(raw)
            .map_err(|e| bad_request("INVALID_AVAILABILITY", &e))?;
        state
            .stores
            .catalog
            .set_item_availability(&id, availability, body.availability_note.as_deref())
            .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    }
    Ok(ok(json!({ "updated": true })))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let item = state
        .stores
        .catalog
        .get_item(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?
        .ok_or_else(|| domain_error("ITEM_NOT_FOUND", "no such item"))?;
    target_business(&caller, Some(&item.business_id))?;
    state
        .stores
        .catalog
        .delete_item(&id)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    Ok(ok(json!({ "deleted": true })))
}
