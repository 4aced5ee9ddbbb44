//! Read-only catalog tools: menu search and opening hours.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;

use super::{require_str, Tool, ToolOutcome};

const SEARCH_LIMIT: usize = 12;

pub struct SearchMenuTool;

#[async_trait]
impl Tool for SearchMenuTool {
    fn name(&self) -> &str {
        "search_menu"
    }

    fn description(&self) -> &str {
        "Search the menu/catalog by name or description. ALWAYS use this to find the \
         item_id before adding anything to the cart; never invent item ids or prices."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Words from the item the customer asked for (e.g. 'margherita')."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let query = match require_str(&input, "query") {
            Ok(q) => q,
            Err(e) => return e,
        };
        match ctx
            .stores
            .catalog
            .search_items(ctx.business_id(), ctx.owner_id(), query, SEARCH_LIMIT)
        {
            Ok(items) if items.is_empty() => {
                ToolOutcome::ok(format!("No items match '{query}'"))
            }
            Ok(items) => {
                let payload: Vec<Value> = items
                    .iter()
                    .map(|i| {
                        json!({
                            "item_id": i.id,
                            "name": i.name,
                            "description": i.description,
                            "price": i.price,
                            "item_type": i.item_type,
                            "availability": i.availability,
                            "availability_note": i.availability_status,
                            "is_schedulable": i.is_schedulable,
                            "min_schedule_hours": i.min_schedule_hours,
                        })
                    })
                    .collect();
                ToolOutcome::ok_with(format!("{} item(s) found", payload.len()), json!(payload))
            }
            Err(e) => ToolOutcome::error(e.code(), e.to_string()),
        }
    }
}

pub struct OpeningHoursTool;

#[async_trait]
impl Tool for OpeningHoursTool {
    fn name(&self) -> &str {
        "get_opening_hours"
    }

    fn description(&self) -> &str {
        "Get the weekly opening hours for this business (branch hours when the branch \
         has its own)."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolOutcome {
        const DAYS: [&str; 7] = [
            "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
        ];
        let mut week = Vec::with_capacity(7);
        for (dow, name) in DAYS.iter().enumerate() {
            let hours = match plaza_catalog::hours::effective_hours(
                &ctx.stores.catalog,
                ctx.owner_id(),
                ctx.business_id(),
                dow as u8,
            ) {
                Ok(h) => h,
                Err(e) => return ToolOutcome::error(e.code(), e.to_string()),
            };
            week.push(match hours {
                Some(h) if !h.is_closed => json!({
                    "day": name,
                    "open": h.open_time,
                    "close": h.close_time,
                    "last_order": h.last_order_time,
                }),
                _ => json!({ "day": name, "closed": true }),
            });
        }
        ToolOutcome::ok_with("Weekly opening hours", json!(week))
    }
}
