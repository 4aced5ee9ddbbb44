//! Support tools: tickets and the human handover.

use async_trait::async_trait;
use plaza_core::types::{SenderKind, TicketPriority};
use plaza_tickets::manager::TicketLinks;
use serde_json::{json, Value};
use std::str::FromStr;
use tracing::{info, warn};

use crate::context::ToolContext;

use super::{optional_str, require_str, Tool, ToolOutcome};

pub struct OpenTicketTool;

#[async_trait]
impl Tool for OpenTicketTool {
    fn name(&self) -> &str {
        "open_support_ticket"
    }

    fn description(&self) -> &str {
        "Open a support ticket for an issue the bot cannot solve (wrong order, \
         refund, complaint). Link the order or reservation when the issue is about one."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "subject": { "type": "string" },
                "details": { "type": "string", "description": "First message of the thread." },
                "priority": { "type": "string", "enum": ["low", "medium", "high", "urgent"] },
                "order_id": { "type": "string" },
                "reservation_id": { "type": "string" }
            },
            "required": ["subject"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let subject = match require_str(&input, "subject") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let priority = optional_str(&input, "priority")
            .and_then(|p| TicketPriority::from_str(p).ok())
            .unwrap_or_default();
        let links = TicketLinks {
            session_id: Some(ctx.session_id.clone()),
            order_id: optional_str(&input, "order_id").map(String::from),
            reservation_id: optional_str(&input, "reservation_id").map(String::from),
        };
        let ticket = match ctx.stores.tickets.open(
            ctx.business_id(),
            &ctx.customer_phone,
            Some(subject),
            priority,
            links,
        ) {
            Ok(t) => t,
            Err(e) => return ToolOutcome::error(e.code(), e.to_string()),
        };
        if let Some(details) = optional_str(&input, "details") {
            if let Err(e) = ctx
                .stores
                .tickets
                .append_message(&ticket.id, SenderKind::Customer, details)
            {
                warn!(ticket = %ticket.id, error = %e, "could not record ticket details");
            }
        }
        ToolOutcome::ok_with(
            format!("Ticket {} opened", ticket.id.chars().take(8).collect::<String>()),
            json!({ "ticket_id": ticket.id, "priority": ticket.priority }),
        )
    }
}

pub struct RequestHumanTool;

#[async_trait]
impl Tool for RequestHumanTool {
    fn name(&self) -> &str {
        "request_human_assistance"
    }

    fn description(&self) -> &str {
        "Hand the conversation over to a human employee. Use when the customer asks \
         for a person, is upset, or the request is beyond the available tools. After \
         this the bot stops replying in this conversation."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string", "description": "Why the handover is needed." }
            },
            "required": ["reason"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let reason = match require_str(&input, "reason") {
            Ok(v) => v,
            Err(e) => return e,
        };

        // Lock first: once human_locked, no further tool use this session.
        if let Err(e) = ctx.stores.sessions.lock_for_human(&ctx.session_id) {
            return ToolOutcome::error(e.code(), e.to_string());
        }

        let ticket = match ctx.stores.tickets.open(
            ctx.business_id(),
            &ctx.customer_phone,
            Some(reason),
            TicketPriority::High,
            TicketLinks {
                session_id: Some(ctx.session_id.clone()),
                ..Default::default()
            },
        ) {
            Ok(t) => t,
            Err(e) => return ToolOutcome::error(e.code(), e.to_string()),
        };

        let note = format!("Handed over to a human employee: {reason}");
        if let Err(e) = ctx
            .stores
            .sessions
            .append_message(&ctx.session_id, SenderKind::System, &note)
        {
            warn!(session = %ctx.session_id, error = %e, "could not log handover message");
        }
        if let Err(e) = ctx
            .stores
            .tickets
            .append_message(&ticket.id, SenderKind::System, &note)
        {
            warn!(ticket = %ticket.id, error = %e, "could not log handover message");
        }

        info!(session = %ctx.session_id, ticket = %ticket.id, "session handed over");
        ToolOutcome::ok_with(
            "A member of the team will take it from here shortly.",
            json!({ "ticket_id": ticket.id }),
        )
    }
}
