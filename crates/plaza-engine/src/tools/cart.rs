//! Cart tools: line edits, delivery settings, and the validated confirm.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::warn;

use plaza_core::types::DeliveryType;
use plaza_orders::types::CartSnapshot;

use crate::context::ToolContext;
use crate::tools::validators::VALIDATE_CART;

use super::{optional_str, require_str, Tool, ToolOutcome};

/// Render a snapshot into the payload every cart tool returns, so the LLM
/// always sees the post-mutation state.
fn cart_payload(snapshot: &CartSnapshot) -> Value {
    json!({
        "cart_id": snapshot.order.id,
        "lines": snapshot.lines.iter().map(|l| json!({
            "line_id": l.id,
            "item_id": l.item_id,
            "name": l.name_at_time,
            "quantity": l.quantity,
            "price": l.price_at_time,
            "notes": l.notes,
        })).collect::<Vec<_>>(),
        "delivery_type": snapshot.order.delivery_type,
        "address": snapshot.order.location_address,
        "scheduled_for": snapshot.order.scheduled_for,
        "notes": snapshot.order.user_notes(),
        "subtotal": snapshot.order.subtotal,
        "delivery_price": snapshot.order.delivery_price,
        "total": snapshot.order.total,
    })
}

pub struct ViewCartTool;

#[async_trait]
impl Tool for ViewCartTool {
    fn name(&self) -> &str {
        "view_cart"
    }

    fn description(&self) -> &str {
        "Show the customer's current cart with line ids, quantities, and totals."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolOutcome {
        match ctx.stores.carts.snapshot(&ctx.cart_key()) {
            Ok(Some(s)) => ToolOutcome::ok_with("Current cart", cart_payload(&s)),
            Ok(None) => ToolOutcome::ok("The cart is empty"),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct AddToCartTool;

#[async_trait]
impl Tool for AddToCartTool {
    fn name(&self) -> &str {
        "add_to_cart"
    }

    fn description(&self) -> &str {
        "Add an item to the cart by item_id (from search_menu). Re-adding the same \
         item with the same notes merges quantities."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "item_id": { "type": "string", "description": "Catalog item id." },
                "quantity": { "type": "integer", "minimum": 1, "description": "How many; defaults to 1." },
                "notes": { "type": "string", "description": "Line notes, e.g. 'no onions'." }
            },
            "required": ["item_id"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let item_id = match require_str(&input, "item_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let quantity = input.get("quantity").and_then(|v| v.as_i64()).unwrap_or(1);
        let notes = optional_str(&input, "notes");
        match ctx
            .stores
            .carts
            .add_line(&ctx.cart_key(), item_id, quantity, notes)
        {
            Ok(s) => ToolOutcome::ok_with("Added to cart", cart_payload(&s)),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct UpdateCartLineTool;

#[async_trait]
impl Tool for UpdateCartLineTool {
    fn name(&self) -> &str {
        "update_cart_line"
    }

    fn description(&self) -> &str {
        "Change the quantity or notes of an existing cart line (line_id from view_cart)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "line_id": { "type": "string" },
                "quantity": { "type": "integer", "minimum": 1 },
                "notes": { "type": "string" }
            },
            "required": ["line_id"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let line_id = match require_str(&input, "line_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let quantity = input.get("quantity").and_then(|v| v.as_i64());
        let notes = optional_str(&input, "notes");
        match ctx
            .stores
            .carts
            .update_line(&ctx.cart_key(), line_id, quantity, notes)
        {
            Ok(s) => ToolOutcome::ok_with("Cart updated", cart_payload(&s)),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct RemoveCartLineTool;

#[async_trait]
impl Tool for RemoveCartLineTool {
    fn name(&self) -> &str {
        "remove_cart_line"
    }

    fn description(&self) -> &str {
        "Remove a line from the cart (line_id from view_cart)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "line_id": { "type": "string" } },
            "required": ["line_id"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let line_id = match require_str(&input, "line_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match ctx.stores.carts.remove_line(&ctx.cart_key(), line_id) {
            Ok(s) => ToolOutcome::ok_with("Line removed", cart_payload(&s)),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct SetDeliveryTypeTool;

#[async_trait]
impl Tool for SetDeliveryTypeTool {
    fn name(&self) -> &str {
        "set_delivery_type"
    }

    fn description(&self) -> &str {
        "Set how the order reaches the customer: takeaway, delivery (address required), \
         or on_site."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "delivery_type": {
                    "type": "string",
                    "enum": ["takeaway", "delivery", "on_site"]
                },
                "address": {
                    "type": "string",
                    "description": "Delivery address; required when delivery_type is 'delivery'."
                }
            },
            "required": ["delivery_type"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let raw = match require_str(&input, "delivery_type") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let delivery_type = match DeliveryType::from_str(raw) {
            Ok(t) => t,
            Err(_) => {
                return ToolOutcome::error(
                    "INVALID_ARGUMENTS",
                    "delivery_type must be takeaway, delivery, or on_site",
                )
            }
        };
        let address = optional_str(&input, "address");
        match ctx
            .stores
            .carts
            .set_delivery_type(&ctx.cart_key(), delivery_type, address)
        {
            Ok(s) => ToolOutcome::ok_with("Delivery type set", cart_payload(&s)),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct SetOrderNotesTool;

#[async_trait]
impl Tool for SetOrderNotesTool {
    fn name(&self) -> &str {
        "set_order_notes"
    }

    fn description(&self) -> &str {
        "Attach order-level notes (e.g. 'ring the bell twice')."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "notes": { "type": "string" } },
            "required": ["notes"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let notes = match require_str(&input, "notes") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match ctx.stores.carts.set_notes(&ctx.cart_key(), notes) {
            Ok(s) => ToolOutcome::ok_with("Notes saved", cart_payload(&s)),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct ClearCartTool;

#[async_trait]
impl Tool for ClearCartTool {
    fn name(&self) -> &str {
        "clear_cart"
    }

    fn description(&self) -> &str {
        "Empty the cart completely. Only on explicit customer request."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolOutcome {
        match ctx.stores.carts.clear(&ctx.cart_key()) {
            Ok(()) => ToolOutcome::ok("Cart cleared"),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct ConfirmOrderTool;

#[async_trait]
impl Tool for ConfirmOrderTool {
    fn name(&self) -> &str {
        "confirm_order"
    }

    fn description(&self) -> &str {
        "Place the order from the current cart. Call validate_cart_for_confirmation \
         first in this same turn; unvalidated confirms are rejected."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn required_validator(&self) -> Option<&'static str> {
        Some(VALIDATE_CART)
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolOutcome {
        match ctx.stores.orders.confirm_cart(&ctx.cart_key(), "bot") {
            Ok(order) => {
                if let Some(lang) = &ctx.language_hint {
                    if let Err(e) = ctx.stores.orders.set_language(&order.id, lang) {
                        warn!(order = %order.id, error = %e, "could not record order language");
                    }
                }
                let short_id: String = order.id.chars().take(8).collect();
                ToolOutcome::ok_with(
                    format!("Order {short_id} placed, status {}", order.status),
                    json!({
                        "order_id": order.id,
                        "short_id": short_id,
                        "status": order.status,
                        "request_type": order.request_type,
                        "scheduled_for": order.scheduled_for,
                        "total": order.total,
                    }),
                )
            }
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}
