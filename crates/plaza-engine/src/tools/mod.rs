//! The tool system the LLM drives.
//!
//! Each tool declares a stable name, a description for the LLM, a JSON
//! schema, and an eligibility predicate; the dispatcher assembles the
//! catalog per turn and refuses mutating tools whose validator has not
//! passed in the same turn.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod reservation;
pub mod scheduling;
pub mod support;
pub mod validators;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ToolContext;
use crate::provider::ToolDefinition;

/// Uniform result envelope every executor returns. Serialized verbatim back
/// to the LLM so it can reason about failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ToolOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error_code: None,
            payload: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error_code: None,
            payload: Some(payload),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error_code: Some(code.into()),
            payload: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"success\":false}".to_string())
    }
}

/// Read a required string argument, or produce the standard error outcome.
pub(crate) fn require_str<'a>(
    input: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str, ToolOutcome> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            ToolOutcome::error(
                "INVALID_ARGUMENTS",
                format!("missing required field '{field}'"),
            )
        })
}

pub(crate) fn optional_str<'a>(input: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Trait every tool implements. Executors never panic and never return Err;
/// failures travel inside the `ToolOutcome`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name (e.g. "confirm_order").
    fn name(&self) -> &str;
    /// What the LLM reads to decide when to call this.
    fn description(&self) -> &str;
    /// JSON Schema for the input object.
    fn input_schema(&self) -> serde_json::Value;
    /// Whether this tool belongs in the catalog for the current turn.
    fn eligible(&self, _ctx: &ToolContext) -> bool {
        true
    }
    /// Validator that must have passed this turn before this tool may run.
    /// None for read-only tools and the validators themselves.
    fn required_validator(&self) -> Option<&'static str> {
        None
    }
    /// Execute against the domain stores.
    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> ToolOutcome;
}

/// Assemble the tool catalog for one turn, eligibility applied.
pub fn build_toolset(ctx: &ToolContext) -> Vec<Box<dyn Tool>> {
    let all: Vec<Box<dyn Tool>> = vec![
        // catalog
        Box::new(catalog::SearchMenuTool),
        Box::new(catalog::OpeningHoursTool),
        // cart
        Box::new(cart::ViewCartTool),
        Box::new(cart::AddToCartTool),
        Box::new(cart::UpdateCartLineTool),
        Box::new(cart::RemoveCartLineTool),
        Box::new(cart::SetDeliveryTypeTool),
        Box::new(cart::SetOrderNotesTool),
        Box::new(cart::ClearCartTool),
        Box::new(cart::ConfirmOrderTool),
        // scheduling
        Box::new(scheduling::ParseDateTimeTool),
        Box::new(scheduling::ScheduleOrderTool),
        // orders
        Box::new(order::MyOrdersTool),
        Box::new(order::OrderStatusTool),
        Box::new(order::CancelOrderTool),
        // reservations
        Box::new(reservation::TableAvailabilityTool),
        Box::new(reservation::CreateTableReservationTool),
        Box::new(reservation::CancelReservationTool),
        Box::new(reservation::AddReservationItemTool),
        Box::new(reservation::MyReservationsTool),
        // support
        Box::new(support::OpenTicketTool),
        Box::new(support::RequestHumanTool),
        // validators
        Box::new(validators::ValidateCartTool),
        Box::new(validators::ValidateReservationTool),
        Box::new(validators::ValidateCancellationTool),
    ];
    all.into_iter().filter(|t| t.eligible(ctx)).collect()
}

/// Convert a toolset to API-level tool definitions.
pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}
