//! Bearer-token authentication for the admin surface.
//!
//! Token issuance lives outside this process; the gateway maps static
//! configured tokens onto principal rows and scopes every request to the
//! principal's business. Admins may act across tenants via ?business_id.

use axum::http::HeaderMap;
use plaza_identity::types::Principal;

use crate::app::AppState;
use crate::http::{forbidden, unauthorized, ApiError};

/// Resolve the caller from the Authorization header.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("missing bearer token"))?;

    let principal_id = state
        .config
        .gateway
        .api_tokens
        .iter()
        .find(|t| t.token == token)
        .map(|t| t.principal_id.clone())
        .ok_or_else(|| unauthorized("unknown token"))?;

    state
        .stores
        .identity
        .get(&principal_id)
        .map_err(|e| unauthorized(&e.to_string()))?
        .ok_or_else(|| unauthorized("token maps to a deleted principal"))
}

/// The business a request operates on: the caller's own, or for admins the
/// explicit ?business_id.
pub fn target_business(
    principal: &Principal,
    explicit: Option<&str>,
) -> Result<String, ApiError> {
    if principal.kind.is_admin() {
        return explicit
            .map(String::from)
            .ok_or_else(|| forbidden("admin requests must pass business_id"));
    }
    let own = principal
        .business_id()
        .ok_or_else(|| forbidden("principal has no business"))?;
    match explicit {
        Some(requested) if requested != own => Err(forbidden("cross-tenant access denied")),
        _ => Ok(own.to_string()),
    }
}

/// Admin-only guard for tenant CRUD.
pub fn require_admin(principal: &Principal) -> Result<(), ApiError> {
    if principal.kind.is_admin() {
        Ok(())
    } else {
        Err(forbidden("admin only"))
    }
}
