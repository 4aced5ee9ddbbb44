//! HTTP surface: response envelopes and the handler modules.
//!
//! Success: `{"data": ...}`. Failure: `{"error": {"code", "message"}}` with
//! an appropriate status.

pub mod addons;
pub mod businesses;
pub mod calendar;
pub mod health;
pub mod items;
pub mod menus;
pub mod orders;
pub mod reservations;
pub mod tables;
pub mod tickets;
pub mod webhooks;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult = Result<Json<Value>, ApiError>;

pub fn ok(data: Value) -> Json<Value> {
    Json(json!({ "data": data }))
}

pub fn err(status: StatusCode, code: &str, message: &str) -> ApiError {
    (
        status,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
}

pub fn unauthorized(message: &str) -> ApiError {
    err(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
}

pub fn forbidden(message: &str) -> ApiError {
    err(StatusCode::FORBIDDEN, "FORBIDDEN", message)
}

pub fn bad_request(code: &str, message: &str) -> ApiError {
    err(StatusCode::BAD_REQUEST, code, message)
}

pub fn not_found(code: &str, message: &str) -> ApiError {
    err(StatusCode::NOT_FOUND, code, message)
}

/// Map a domain error code onto an HTTP status. Contention and transition
/// failures are conflicts; unknown ids are 404s; the rest are 400s.
pub fn domain_error(code: &str, message: &str) -> ApiError {
    let status = match code {
        "ORDER_NOT_FOUND" | "RESERVATION_NOT_FOUND" | "ITEM_NOT_FOUND" | "TABLE_NOT_FOUND"
        | "MENU_NOT_FOUND" | "PRINCIPAL_NOT_FOUND" | "TICKET_NOT_FOUND" | "LINE_NOT_FOUND" => {
            StatusCode::NOT_FOUND
        }
        "INVALID_TRANSITION" | "SLOT_TAKEN" | "INSUFFICIENT_STOCK" | "CANCEL_DEADLINE_PASSED" => {
            StatusCode::CONFLICT
        }
        "DATABASE_ERROR" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    err(status, code, message)
}
