//! System prompt assembly for one conversational turn.

use chrono::Datelike;
use plaza_core::types::BusinessType;
use plaza_orders::types::CartSnapshot;

use crate::context::ToolContext;

/// Vocabulary hints per vertical so replies sound right ("menu" vs
/// "services", "table" vs "appointment").
fn terminology(business_type: Option<BusinessType>) -> &'static str {
    match business_type {
        Some(BusinessType::FoodAndBeverage) => {
            "This is a food & beverage business: talk about the menu, dishes, \
             takeaway/delivery, and tables."
        }
        Some(BusinessType::Salon) => {
            "This is a salon: talk about services, appointments, and durations \
             rather than dishes or tables."
        }
        Some(BusinessType::Rental) => {
            "This is a rental business: talk about items, rental periods, and \
             pickup/return."
        }
        _ => "Use neutral retail vocabulary: items, orders, pickup or delivery.",
    }
}

/// Build the per-turn system prompt from business profile, session state,
/// and the current cart.
pub fn build_system_prompt(ctx: &ToolContext, cart: Option<&CartSnapshot>) -> String {
    let business = &ctx.tenant.business;
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!(
        "You are the ordering assistant for {name}, replying over {platform}.\n",
        name = business.display_name,
        platform = ctx.platform,
    ));
    if let Some(branch) = &ctx.tenant.branch {
        prompt.push_str(&format!("The customer is talking to the {} branch.\n", branch.display_name));
    }
    prompt.push_str(terminology(ctx.business_type()));
    prompt.push('\n');

    let now_local = ctx.now_local();
    prompt.push_str(&format!(
        "Local date and time: {}.\n",
        now_local.format("%A %Y-%m-%d %H:%M")
    ));

    let dow = now_local.date().weekday().num_days_from_monday() as u8;
    match plaza_catalog::hours::effective_hours(
        &ctx.stores.catalog,
        ctx.owner_id(),
        ctx.business_id(),
        dow,
    ) {
        Ok(Some(h)) if !h.is_closed => {
            prompt.push_str(&format!(
                "Today's opening hours: {} to {}{}.\n",
                h.open_time.as_deref().unwrap_or("?"),
                h.close_time.as_deref().unwrap_or("?"),
                h.last_order_time
                    .as_deref()
                    .map(|t| format!(" (last orders {t})"))
                    .unwrap_or_default(),
            ));
        }
        _ => prompt.push_str("The business is closed today.\n"),
    }

    match cart {
        Some(snapshot) if !snapshot.lines.is_empty() => {
            prompt.push_str("Current cart:\n");
            for line in &snapshot.lines {
                prompt.push_str(&format!(
                    "- {} x{} ({:.2} each)\n",
                    line.name_at_time, line.quantity, line.price_at_time
                ));
            }
            prompt.push_str(&format!("Cart total: {:.2}\n", snapshot.order.total));
        }
        _ => prompt.push_str("The cart is currently empty.\n"),
    }

    if let Some(lang) = &ctx.language_hint {
        prompt.push_str(&format!("Reply in the customer's language: {lang}.\n"));
    }

    prompt.push_str(
        "\nRules:\n\
         - Use the tools for every fact and every change; never invent items, \
           prices, availability, or ids.\n\
         - Before confirm_order, create_table_reservation, cancel_order, or \
           cancel_reservation you MUST run the matching validate_* tool in the \
           same turn and it must pass.\n\
         - When a tool returns an error, explain it helpfully and offer an \
           alternative; do not retry the same call unchanged.\n\
         - Keep replies short and friendly; this is a messaging chat.\n",
    );

    prompt
}
