//! Validator tools: the read-only predicates mutating tools depend on.
//!
//! A passing run records itself on the turn context; a failing run clears
//! any earlier pass so a stale green light cannot authorise a mutation.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::validation;

use super::{optional_str, require_str, Tool, ToolOutcome};

pub const VALIDATE_CART: &str = "validate_cart_for_confirmation";
pub const VALIDATE_RESERVATION: &str = "validate_reservation_request";
pub const VALIDATE_CANCELLATION: &str = "validate_cancellation_eligibility";

fn report_outcome(
    ctx: &ToolContext,
    validator: &'static str,
    report: validation::ValidationReport,
) -> ToolOutcome {
    if report.valid {
        ctx.record_validation(validator);
    } else {
        ctx.clear_validation(validator);
    }
    ToolOutcome {
        success: report.valid,
        message: Some(if report.valid {
            "All checks passed".to_string()
        } else {
            "Validation failed".to_string()
        }),
        error_code: report.errors.first().map(|i| i.code.clone()),
        payload: Some(report.to_json()),
    }
}

pub struct ValidateCartTool;

#[async_trait]
impl Tool for ValidateCartTool {
    fn name(&self) -> &str {
        VALIDATE_CART
    }

    fn description(&self) -> &str {
        "Check whether the cart can be confirmed (non-empty, delivery settings \
         complete, business open or schedule valid). MUST pass in this turn before \
         confirm_order."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolOutcome {
        report_outcome(ctx, VALIDATE_CART, validation::validate_cart_for_confirmation(ctx))
    }
}

pub struct ValidateReservationTool;

#[async_trait]
impl Tool for ValidateReservationTool {
    fn name(&self) -> &str {
        VALIDATE_RESERVATION
    }

    fn description(&self) -> &str {
        "Check whether a table reservation is feasible (valid future slot, within \
         opening hours, a table fits). MUST pass in this turn before \
         create_table_reservation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date": { "type": "string", "description": "YYYY-MM-DD" },
                "time": { "type": "string", "description": "HH:MM, 24-hour" },
                "guests": { "type": "integer", "minimum": 1 }
            },
            "required": ["date", "time"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let date = match require_str(&input, "date") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let time = match require_str(&input, "time") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let guests = input.get("guests").and_then(|v| v.as_u64()).map(|v| v as u32);
        report_outcome(
            ctx,
            VALIDATE_RESERVATION,
            validation::validate_reservation_request(ctx, date, time, guests),
        )
    }
}

pub struct ValidateCancellationTool;

#[async_trait]
impl Tool for ValidateCancellationTool {
    fn name(&self) -> &str {
        VALIDATE_CANCELLATION
    }

    fn description(&self) -> &str {
        "Check whether this customer may still cancel an order or reservation \
         (ownership, future time, cancellation window). MUST pass in this turn \
         before cancel_order or cancel_reservation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "order_id": { "type": "string" },
                "reservation_id": { "type": "string" }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let order_id = optional_str(&input, "order_id");
        let reservation_id = optional_str(&input, "reservation_id");
        report_outcome(
            ctx,
            VALIDATE_CANCELLATION,
            validation::validate_cancellation_eligibility(ctx, order_id, reservation_id),
        )
    }
}
