//! Webhook ingress, one route per platform.
//!
//! The channel transports deliver a normalised JSON body; the handler
//! authenticates the delivery (HMAC-SHA256 signature or static verify
//! token, per channel config), deduplicates by provider message id, answers
//! 2xx immediately, and processes the turn on its own task. The reply goes
//! out through the dispatcher, never from here directly.

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use hmac::{Hmac, Mac};
use plaza_channels::OutboundPayload;
use plaza_core::config::{ChannelWebhookConfig, WebhookAuthMode};
use plaza_core::types::Platform;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::app::AppState;
use crate::http::{bad_request, err, not_found, ApiError};
use plaza_engine::InboundMessage;

type HmacSha256 = Hmac<Sha256>;

/// The normalised inbound event every channel transport posts.
#[derive(Debug, Deserialize)]
pub struct InboundEvent {
    pub tenant_phone_number_id: String,
    pub from_customer: String,
    pub message: InboundBody,
    pub provider_message_id: String,
    #[allow(dead_code)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InboundBody {
    pub text: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

fn channel_config<'a>(
    state: &'a AppState,
    platform: Platform,
) -> Option<&'a ChannelWebhookConfig> {
    let channels = &state.config.channels;
    match platform {
        Platform::Whatsapp => channels.whatsapp.as_ref(),
        Platform::Telegram => channels.telegram.as_ref(),
        Platform::Instagram => channels.instagram.as_ref(),
        Platform::Facebook => channels.facebook.as_ref(),
        Platform::Dashboard => None,
    }
}

/// GET: the Meta-style subscription handshake (echo hub.challenge).
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, ApiError> {
    let platform = parse_platform(&platform)?;
    let cfg = channel_config(&state, platform)
        .ok_or_else(|| not_found("CHANNEL_DISABLED", "channel is not configured"))?;

    match (query.verify_token.as_deref(), query.challenge) {
        (Some(token), Some(challenge)) if token == cfg.verify_token => Ok(challenge),
        _ => Err(err(
            StatusCode::UNAUTHORIZED,
            "VERIFY_FAILED",
            "verify token mismatch",
        )),
    }
}

/// POST: an inbound customer message. Responds 2xx right away; the engine
/// turn runs asynchronously.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let platform = parse_platform(&platform)?;
    let cfg = channel_config(&state, platform)
        .ok_or_else(|| not_found("CHANNEL_DISABLED", "channel is not configured"))?;

    // Authenticate before touching the payload.
    match cfg.auth_mode {
        WebhookAuthMode::HmacSha256 => {
            verify_hmac_sha256(&headers, &body, cfg.app_secret.as_deref())
                .map_err(|reason| auth_error(platform, &reason))?;
        }
        WebhookAuthMode::VerifyToken => {
            verify_token_header(&headers, &cfg.verify_token)
                .map_err(|reason| auth_error(platform, &reason))?;
        }
    }

    let event: InboundEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!(%platform, error = %e, "invalid JSON in webhook body");
        bad_request("INVALID_BODY", "body is not a valid inbound event")
    })?;

    // Providers redeliver; only the first copy is processed.
    if !state.first_delivery(&event.provider_message_id) {
        info!(id = %event.provider_message_id, "duplicate webhook delivery dropped");
        return Ok(Json(json!({ "status": "duplicate" })));
    }

    let language = event.message.language.clone();
    let Some(text) = event.message.text.filter(|t| !t.trim().is_empty()) else {
        // Media-only messages are acknowledged but not dispatched.
        return Ok(Json(json!({ "status": "ignored" })));
    };

    let inbound = InboundMessage {
        platform,
        tenant_external_id: event.tenant_phone_number_id,
        customer_phone: event.from_customer,
        text,
        language,
    };

    let state_for_task = state.clone();
    tokio::spawn(async move {
        process_turn(state_for_task, inbound).await;
    });

    Ok(Json(json!({ "status": "accepted" })))
}

async fn process_turn(state: Arc<AppState>, inbound: InboundMessage) {
    let platform = inbound.platform;
    let customer = inbound.customer_phone.clone();

    let outcome = match state.engine.handle_inbound(inbound).await {
        Ok(o) => o,
        Err(e) => {
            warn!(error = %e, "turn processing failed");
            return;
        }
    };

    let Some(reply) = outcome.reply else { return };

    let owner = match state.stores.identity.get(&outcome.owner_id) {
        Ok(Some(p)) => p,
        _ => {
            warn!(owner = %outcome.owner_id, "owner disappeared before reply");
            return;
        }
    };
    if let Err(e) = state
        .outbound
        .send(&owner, platform, &customer, &OutboundPayload::text(reply))
        .await
    {
        warn!(error = %e, %platform, "reply delivery failed");
    }
}

/// Verify Meta-style HMAC-SHA256: `sha256=<hex>` in X-Hub-Signature-256,
/// computed over the raw request body.
fn verify_hmac_sha256(
    headers: &HeaderMap,
    body: &Bytes,
    secret: Option<&str>,
) -> Result<(), String> {
    let secret = secret.ok_or_else(|| "no app secret configured for this channel".to_string())?;

    let sig_header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing X-Hub-Signature-256 header".to_string())?;

    let sig_hex = sig_header
        .strip_prefix("sha256=")
        .ok_or_else(|| "malformed X-Hub-Signature-256 header".to_string())?;

    let expected =
        hex::decode(sig_hex).map_err(|_| "X-Hub-Signature-256 is not valid hex".to_string())?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "invalid HMAC key length".to_string())?;
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| "HMAC signature mismatch".to_string())
}

/// Verify the static token in the `x-verify-token` header.
fn verify_token_header(headers: &HeaderMap, expected: &str) -> Result<(), String> {
    let token = headers
        .get("x-verify-token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "missing x-verify-token header".to_string())?;
    if token == expected {
        Ok(())
    } else {
        Err("verify token mismatch".to_string())
    }
}

fn auth_error(platform: Platform, reason: &str) -> ApiError {
    warn!(%platform, reason, "webhook authentication failed");
    err(StatusCode::UNAUTHORIZED, "VERIFY_FAILED", reason)
}

fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    let platform = Platform::from_str(raw)
        .map_err(|_| bad_request("UNKNOWN_PLATFORM", "unknown webhook platform"))?;
    if platform == Platform::Dashboard {
        return Err(bad_request("UNKNOWN_PLATFORM", "dashboard has no webhook"));
    }
    Ok(platform)
}
