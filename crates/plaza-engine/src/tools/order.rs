//! Customer-facing order tools. Lookups are tenancy-scoped: another
//! customer's order reads as not-found.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tools::validators::VALIDATE_CANCELLATION;

use super::{require_str, Tool, ToolOutcome};

const LIST_LIMIT: usize = 10;

fn order_payload(order: &plaza_orders::types::Order) -> Value {
    json!({
        "order_id": order.id,
        "short_id": order.id.chars().take(8).collect::<String>(),
        "status": order.status,
        "request_type": order.request_type,
        "scheduled_for": order.scheduled_for,
        "delivery_type": order.delivery_type,
        "total": order.total,
        "created_at": order.created_at,
    })
}

pub struct MyOrdersTool;

#[async_trait]
impl Tool for MyOrdersTool {
    fn name(&self) -> &str {
        "my_orders"
    }

    fn description(&self) -> &str {
        "List this customer's recent orders with ids and statuses."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolOutcome {
        match ctx.stores.orders.list_for_customer(
            ctx.business_id(),
            &ctx.customer_phone,
            LIST_LIMIT,
        ) {
            Ok(orders) if orders.is_empty() => ToolOutcome::ok("No orders yet"),
            Ok(orders) => {
                let payload: Vec<Value> = orders.iter().map(order_payload).collect();
                ToolOutcome::ok_with(format!("{} order(s)", payload.len()), json!(payload))
            }
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct OrderStatusTool;

#[async_trait]
impl Tool for OrderStatusTool {
    fn name(&self) -> &str {
        "get_order_status"
    }

    fn description(&self) -> &str {
        "Get the current status and items of one of this customer's orders."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "order_id": { "type": "string" } },
            "required": ["order_id"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let order_id = match require_str(&input, "order_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let order = match ctx.stores.orders.get_for_customer(
            order_id,
            ctx.business_id(),
            &ctx.customer_phone,
        ) {
            Ok(o) => o,
            Err(e) => return ToolOutcome::error(e.code(), e.to_string()),
        };
        let items = match ctx.stores.orders.items_of(&order.id) {
            Ok(i) => i,
            Err(e) => return ToolOutcome::error(e.code(), e.to_string()),
        };
        let mut payload = order_payload(&order);
        payload["items"] = json!(items
            .iter()
            .map(|i| json!({
                "name": i.name_at_time,
                "quantity": i.quantity,
                "price": i.price_at_time,
            }))
            .collect::<Vec<_>>());
        ToolOutcome::ok_with(format!("Order is {}", order.status), payload)
    }
}

pub struct CancelOrderTool;

#[async_trait]
impl Tool for CancelOrderTool {
    fn name(&self) -> &str {
        "cancel_order"
    }

    fn description(&self) -> &str {
        "Cancel one of this customer's scheduled orders. Call \
         validate_cancellation_eligibility first in this same turn."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "order_id": { "type": "string" } },
            "required": ["order_id"]
        })
    }

    fn required_validator(&self) -> Option<&'static str> {
        Some(VALIDATE_CANCELLATION)
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let order_id = match require_str(&input, "order_id") {
            Ok(v) => v,
            Err(e) => return e,
        };
        match ctx.stores.orders.cancel_by_customer(
            order_id,
            ctx.business_id(),
            &ctx.customer_phone,
            ctx.default_cancel_hours,
        ) {
            Ok(order) => ToolOutcome::ok_with(
                "Order cancelled",
                json!({ "order_id": order.id, "status": order.status }),
            ),
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}
