//! Calendar read: scheduled orders and reservations in a date range, merged
//! into one chronological feed for the dashboard.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::{authenticate, target_business};
use crate::http::{domain_error, ok, ApiResult};

#[derive(Deserialize)]
pub struct RangeQuery {
    pub business_id: Option<String>,
    /// Inclusive "YYYY-MM-DD".
    pub from: String,
    pub to: String,
}

pub async fn range(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<RangeQuery>,
) -> ApiResult {
    let caller = authenticate(&state, &headers)?;
    let business_id = target_business(&caller, query.business_id.as_deref())?;

    let mut events: Vec<Value> = Vec::new();

    let orders = state
        .stores
        .orders
        .list_for_business(&business_id, None, 500)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    for order in orders {
        let Some(scheduled_for) = order.scheduled_for.as_deref() else {
            continue;
        };
        let Ok(at) = DateTime::parse_from_rfc3339(scheduled_for) else {
            continue;
        };
        let day = at.format("%Y-%m-%d").to_string();
        if day < query.from || day > query.to {
            continue;
        }
        events.push(json!({
            "kind": "scheduled_order",
            "id": order.id,
            "date": day,
            "time": at.format("%H:%M").to_string(),
            "status": order.status,
            "customer": order.customer_phone_number,
            "total": order.total,
        }));
    }

    let reservations = state
        .stores
        .reservations
        .list_range(&business_id, &query.from, &query.to)
        .map_err(|e| domain_error(e.code(), &e.to_string()))?;
    for r in reservations {
        events.push(json!({
            "kind": "reservation",
            "id": r.id,
            "date": r.reservation_date,
            "time": r.reservation_time,
            "status": r.status,
            "customer": r.customer_name,
            "guests": r.number_of_guests,
        }));
    }

    events.sort_by(|a, b| {
        let key = |v: &Value| {
            format!(
                "{} {}",
                v["date"].as_str().unwrap_or(""),
                v["time"].as_str().unwrap_or("")
            )
        };
        key(a).cmp(&key(b))
    });

    Ok(ok(json!(events)))
}
