//! Scheduling tools: the natural-language date parser and the cart schedule
//! setter. Resolution happens in the business's local clock; storage is UTC.

use async_trait::async_trait;
use chrono::{Datelike, NaiveTime};
use serde_json::{json, Value};

use plaza_catalog::hours::{effective_hours, is_open_at, opening_minute};

use crate::context::ToolContext;
use crate::datetime::{ensure_future, parse_expression};

use super::{require_str, Tool, ToolOutcome};

/// Resolve an expression to a concrete local datetime, filling a missing time
/// with the venue's opening time that day.
fn resolve_expression(
    ctx: &ToolContext,
    expression: &str,
) -> Result<(chrono::NaiveDateTime, bool), ToolOutcome> {
    let now_local = ctx.now_local();
    let when = parse_expression(expression, now_local)
        .map_err(|e| ToolOutcome::error(e.code(), e.to_string()))?;

    let dow = when.date.weekday().num_days_from_monday() as u8;
    let hours = effective_hours(&ctx.stores.catalog, ctx.owner_id(), ctx.business_id(), dow)
        .map_err(|e| ToolOutcome::error(e.code(), e.to_string()))?;

    let (time, defaulted) = match when.time {
        Some(t) => (t, false),
        // Date-only request: fall back to the next opening time that day.
        None => match opening_minute(hours.as_ref()) {
            Some(minute) => (
                NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap_or_default(),
                true,
            ),
            None => {
                return Err(ToolOutcome::error(
                    "BUSINESS_CLOSED",
                    format!("The business is closed on {}", when.date),
                ))
            }
        },
    };

    let local = when.date.and_time(time);
    ensure_future(local, now_local).map_err(|e| ToolOutcome::error(e.code(), e.to_string()))?;

    let minute_of_day = {
        use chrono::Timelike;
        time.hour() * 60 + time.minute()
    };
    if !is_open_at(hours.as_ref(), minute_of_day) {
        return Err(ToolOutcome::error(
            "BUSINESS_CLOSED",
            format!("The business is closed at {} on {}", time.format("%H:%M"), when.date),
        ));
    }

    Ok((local, defaulted))
}

pub struct ParseDateTimeTool;

#[async_trait]
impl Tool for ParseDateTimeTool {
    fn name(&self) -> &str {
        "parse_datetime"
    }

    fn description(&self) -> &str {
        "Resolve a natural-language date/time ('tomorrow at 7pm', 'Friday 6:30', \
         'in 2 hours') into a concrete timestamp in the business timezone. ALWAYS \
         call this before scheduling anything; never guess timestamps yourself."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The customer's wording for the date/time."
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let expression = match require_str(&input, "expression") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match resolve_expression(ctx, expression) {
            Ok((local, defaulted)) => {
                let utc = ctx.local_to_utc(local);
                ToolOutcome::ok_with(
                    format!("Resolved to {} local", local.format("%Y-%m-%d %H:%M")),
                    json!({
                        "local": local.format("%Y-%m-%d %H:%M").to_string(),
                        "utc": utc.to_rfc3339(),
                        "time_was_defaulted_to_opening": defaulted,
                    }),
                )
            }
            Err(outcome) => outcome,
        }
    }
}

pub struct ScheduleOrderTool;

#[async_trait]
impl Tool for ScheduleOrderTool {
    fn name(&self) -> &str {
        "schedule_order"
    }

    fn description(&self) -> &str {
        "Schedule the current cart for a future time, or clear the schedule. The \
         expression is parsed like parse_datetime; items with a minimum notice are \
         checked at confirmation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "When to fulfil the order (e.g. 'tomorrow 13:00')."
                },
                "clear": {
                    "type": "boolean",
                    "description": "true to remove the schedule and make it an immediate order."
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        if input.get("clear").and_then(|v| v.as_bool()).unwrap_or(false) {
            return match ctx.stores.carts.set_scheduled(&ctx.cart_key(), None) {
                Ok(_) => ToolOutcome::ok("Schedule cleared; the order is immediate"),
                Err(e) => ToolOutcome::error(e.code(), e.to_string()),
            };
        }
        let expression = match require_str(&input, "expression") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let (local, _) = match resolve_expression(ctx, expression) {
            Ok(v) => v,
            Err(outcome) => return outcome,
        };
        let utc = ctx.local_to_utc(local).to_rfc3339();
        match ctx.stores.carts.set_scheduled(&ctx.cart_key(), Some(&utc)) {
            Ok(s) => ToolOutcome::ok_with(
                format!("Scheduled for {} local", local.format("%Y-%m-%d %H:%M")),
                json!({ "scheduled_for": s.order.scheduled_for }),
            ),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}
