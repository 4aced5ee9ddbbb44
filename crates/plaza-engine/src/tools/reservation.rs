//! Table reservation tools. The whole family is gated on the business being
//! F&B with the `table_reservations` addon active; the executors keep the
//! same guard so a stale catalog can never book anyway.

use async_trait::async_trait;
use plaza_core::types::{BusinessType, ReservationType};
use plaza_identity::types::ADDON_TABLE_RESERVATIONS;
use plaza_reservations::types::NewReservation;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tools::validators::{VALIDATE_CANCELLATION, VALIDATE_RESERVATION};

use super::{optional_str, require_str, Tool, ToolOutcome};

fn reservations_enabled(ctx: &ToolContext) -> bool {
    ctx.business_type() == Some(BusinessType::FoodAndBeverage)
        && ctx.addon_active(ADDON_TABLE_RESERVATIONS)
}

fn gate(ctx: &ToolContext) -> Option<ToolOutcome> {
    if reservations_enabled(ctx) {
        None
    } else {
        Some(ToolOutcome::error(
            "ADDON_INACTIVE",
            "Table reservations are not enabled for this business",
        ))
    }
}

fn reservation_payload(r: &plaza_reservations::types::Reservation) -> Value {
    json!({
        "reservation_id": r.id,
        "short_id": r.id.chars().take(8).collect::<String>(),
        "date": r.reservation_date,
        "time": r.reservation_time,
        "guests": r.number_of_guests,
        "status": r.status,
        "table_id": r.table_id,
    })
}

pub struct TableAvailabilityTool;

#[async_trait]
impl Tool for TableAvailabilityTool {
    fn name(&self) -> &str {
        "check_table_availability"
    }

    fn description(&self) -> &str {
        "List tables free for a date (YYYY-MM-DD) and time (HH:MM), optionally \
         filtered by guest count and position preference (e.g. 'terrace')."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date": { "type": "string", "description": "YYYY-MM-DD" },
                "time": { "type": "string", "description": "HH:MM, 24-hour" },
                "guests": { "type": "integer", "minimum": 1 },
                "position": { "type": "string", "description": "Substring of the position label." }
            },
            "required": ["date", "time"]
        })
    }

    fn eligible(&self, ctx: &ToolContext) -> bool {
        reservations_enabled(ctx)
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        if let Some(refused) = gate(ctx) {
            return refused;
        }
        let date = match require_str(&input, "date") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let time = match require_str(&input, "time") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let guests = input.get("guests").and_then(|v| v.as_u64()).map(|v| v as u32);
        let position = optional_str(&input, "position");
        match ctx
            .stores
            .reservations
            .available_for_slot(ctx.owner_id(), date, time, guests, position)
        {
            Ok(tables) if tables.is_empty() => {
                ToolOutcome::error("NO_TABLES_AVAILABLE", "No table fits that slot")
            }
            Ok(tables) => {
                let payload: Vec<Value> = tables
                    .iter()
                    .map(|t| {
                        json!({
                            "table_number": t.table_number,
                            "min_seats": t.min_seats,
                            "max_seats": t.max_seats,
                            "position": t.position_label,
                        })
                    })
                    .collect();
                ToolOutcome::ok_with(format!("{} table(s) free", payload.len()), json!(payload))
            }
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct CreateTableReservationTool;

#[async_trait]
impl Tool for CreateTableReservationTool {
    fn name(&self) -> &str {
        "create_table_reservation"
    }

    fn description(&self) -> &str {
        "Reserve a table. Requires the customer's name. Call \
         validate_reservation_request first in this same turn. Leave table_number \
         out to auto-select the best fit."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date": { "type": "string", "description": "YYYY-MM-DD" },
                "time": { "type": "string", "description": "HH:MM, 24-hour" },
                "customer_name": { "type": "string" },
                "guests": { "type": "integer", "minimum": 1 },
                "table_number": { "type": "integer", "description": "Explicit table choice." },
                "position": { "type": "string", "description": "Preference like 'terrace' or 'window'." },
                "notes": { "type": "string" }
            },
            "required": ["date", "time", "customer_name"]
        })
    }

    fn eligible(&self, ctx: &ToolContext) -> bool {
        reservations_enabled(ctx)
    }

    fn required_validator(&self) -> Option<&'static str> {
        Some(VALIDATE_RESERVATION)
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        if let Some(refused) = gate(ctx) {
            return refused;
        }
        let date = match require_str(&input, "date") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let time = match require_str(&input, "time") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let req = NewReservation {
            business_user_id: ctx.business_id().to_string(),
            owner_user_id: ctx.owner_id().to_string(),
            customer_phone_number: ctx.customer_phone.clone(),
            customer_name: optional_str(&input, "customer_name").map(String::from),
            reservation_date: date.to_string(),
            reservation_time: time.to_string(),
            number_of_guests: input.get("guests").and_then(|v| v.as_u64()).map(|v| v as u32),
            reservation_type: ReservationType::Table,
            table_number: input.get("table_number").and_then(|v| v.as_i64()),
            position_pref: optional_str(&input, "position").map(String::from),
            notes: optional_str(&input, "notes").map(String::from),
        };
        match ctx.stores.reservations.create(req) {
            Ok(r) => ToolOutcome::ok_with(
                format!(
                    "Reserved for {} at {} ({})",
                    r.reservation_date,
                    r.reservation_time,
                    r.id.chars().take(8).collect::<String>()
                ),
                reservation_payload(&r),
            ),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct CancelReservationTool;

#[async_trait]
impl Tool for CancelReservationTool {
    fn name(&self) -> &str {
        "cancel_reservation"
    }

    fn description(&self) -> &str {
        "Cancel one of this customer's confirmed reservations. Call \
         validate_cancellation_eligibility first in this same turn."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "reservation_id": { "type": "string" } },
            "required": ["reservation_id"]
        })
    }

    fn eligible(&self, ctx: &ToolContext) -> bool {
        reservations_enabled(ctx)
    }

    fn required_validator(&self) -> Option<&'static str> {
        Some(VALIDATE_CANCELLATION)
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        if let Some(refused) = gate(ctx) {
            return refused;
        }
        let reservation_id = match require_str(&input, "reservation_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        // Ownership check before the mutation; foreign ids read as not-found.
        if let Err(e) = ctx.stores.reservations.get_for_customer(
            reservation_id,
            ctx.business_id(),
            &ctx.customer_phone,
        ) {
            return ToolOutcome::error(e.code(), e.to_string());
        }
        match ctx.stores.reservations.cancel(reservation_id) {
            Ok(r) => ToolOutcome::ok_with("Reservation cancelled", reservation_payload(&r)),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct AddReservationItemTool;

#[async_trait]
impl Tool for AddReservationItemTool {
    fn name(&self) -> &str {
        "add_reservation_item"
    }

    fn description(&self) -> &str {
        "Pre-order an item for a confirmed reservation (item_id from search_menu)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reservation_id": { "type": "string" },
                "item_id": { "type": "string" },
                "quantity": { "type": "integer", "minimum": 1 },
                "notes": { "type": "string" }
            },
            "required": ["reservation_id", "item_id"]
        })
    }

    fn eligible(&self, ctx: &ToolContext) -> bool {
        reservations_enabled(ctx)
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        if let Some(refused) = gate(ctx) {
            return refused;
        }
        let reservation_id = match require_str(&input, "reservation_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let item_id = match require_str(&input, "item_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let quantity = input.get("quantity").and_then(|v| v.as_i64()).unwrap_or(1);
        if let Err(e) = ctx.stores.reservations.get_for_customer(
            reservation_id,
            ctx.business_id(),
            &ctx.customer_phone,
        ) {
            return ToolOutcome::error(e.code(), e.to_string());
        }
        match ctx.stores.reservations.add_item(
            reservation_id,
            item_id,
            quantity,
            optional_str(&input, "notes"),
        ) {
            Ok(line) => ToolOutcome::ok_with(
                format!("{} x{} pre-ordered", line.name_at_time, line.quantity),
                json!({ "line_id": line.id, "price": line.price_at_time }),
            ),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct MyReservationsTool;

#[async_trait]
impl Tool for MyReservationsTool {
    fn name(&self) -> &str {
        "my_reservations"
    }

    fn description(&self) -> &str {
        "List this customer's reservations with ids, dates, and statuses."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn eligible(&self, ctx: &ToolContext) -> bool {
        reservations_enabled(ctx)
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolOutcome {
        match ctx.stores.reservations.list_for_customer(
            ctx.business_id(),
            &ctx.customer_phone,
            10,
        ) {
            Ok(list) if list.is_empty() => ToolOutcome::ok("No reservations yet"),
            Ok(list) => {
                let payload: Vec<Value> = list.iter().map(reservation_payload).collect();
                ToolOutcome::ok_with(format!("{} reservation(s)", payload.len()), json!(payload))
            }
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}
