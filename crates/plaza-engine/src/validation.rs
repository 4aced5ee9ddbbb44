//! Read-only validation predicates the LLM must consult before mutating.
//!
//! Each returns a structured report and never errors out: internal failures
//! become issues inside the report. The dispatcher records a pass per turn
//! and gates the corresponding mutating tool on it.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use plaza_catalog::hours::{effective_hours, is_open_at, last_order_passed, parse_hhmm};
use plaza_core::types::{DeliveryType, OrderStatus, ReservationStatus};
use plaza_orders::lifecycle::check_cancellation;
use plaza_orders::OrderError;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::ToolContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub code: String,
    pub message: String,
}

impl Issue {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationReport {
    fn from_issues(errors: Vec<Issue>, warnings: Vec<Issue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"valid": false}))
    }
}

/// Everything `confirm_order` needs to be true.
pub fn validate_cart_for_confirmation(ctx: &ToolContext) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let snapshot = match ctx.stores.carts.snapshot(&ctx.cart_key()) {
        Ok(Some(s)) if !s.lines.is_empty() => s,
        Ok(_) => {
            errors.push(Issue::new("EMPTY_CART", "The cart is empty"));
            return ValidationReport::from_issues(errors, warnings);
        }
        Err(e) => {
            warn!(error = %e, "cart snapshot failed during validation");
            errors.push(Issue::new("DATABASE_ERROR", "Could not read the cart"));
            return ValidationReport::from_issues(errors, warnings);
        }
    };

    let delivery_type = snapshot.order.delivery_type;
    match delivery_type {
        None => errors.push(Issue::new(
            "MISSING_DELIVERY_TYPE",
            "Choose takeaway, delivery, or on-site first",
        )),
        Some(DeliveryType::Delivery) => {
            let has_address = snapshot
                .order
                .location_address
                .as_deref()
                .map(str::trim)
                .map(|a| !a.is_empty())
                .unwrap_or(false);
            if !has_address {
                errors.push(Issue::new(
                    "MISSING_ADDRESS",
                    "A delivery address is required",
                ));
            }
        }
        Some(_) => {}
    }

    let now_local = ctx.now_local();
    match snapshot.order.scheduled_for.as_deref() {
        Some(scheduled) => {
            match DateTime::parse_from_rfc3339(scheduled) {
                Ok(at) => {
                    let at_utc = at.with_timezone(&Utc);
                    let at_local =
                        (at_utc + Duration::minutes(ctx.tz_offset_minutes as i64)).naive_utc();
                    if at_utc <= Utc::now() {
                        errors.push(Issue::new(
                            "PAST_DATE_TIME",
                            "The requested time is already in the past",
                        ));
                    }
                    check_open_at(ctx, at_local.date(), Some(minutes_of(at_local.time())), &mut errors);
                    check_schedule_notice(ctx, &snapshot, at_utc, &mut errors, &mut warnings);
                }
                Err(_) => errors.push(Issue::new(
                    "INVALID_DATE_FORMAT",
                    "The scheduled time is not a valid timestamp",
                )),
            }
        }
        None => {
            let minute = minutes_of(now_local.time());
            let dow = now_local.date().weekday().num_days_from_monday() as u8;
            match effective_hours(&ctx.stores.catalog, ctx.owner_id(), ctx.business_id(), dow) {
                Ok(hours) => {
                    if !is_open_at(hours.as_ref(), minute) {
                        errors.push(Issue::new("BUSINESS_CLOSED", "The business is closed right now"));
                    } else if last_order_passed(hours.as_ref(), minute) {
                        errors.push(Issue::new(
                            "LAST_ORDER_TIME_PASSED",
                            "Last order time has passed for today",
                        ));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "opening hours lookup failed");
                    errors.push(Issue::new("DATABASE_ERROR", "Could not read opening hours"));
                }
            }
        }
    }

    ValidationReport::from_issues(errors, warnings)
}

/// Feasibility of a reservation request, before any insert.
pub fn validate_reservation_request(
    ctx: &ToolContext,
    date: &str,
    time: &str,
    guests: Option<u32>,
) -> ValidationReport {
    let mut errors = Vec::new();
    let warnings = Vec::new();

    let parsed_date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d");
    let parsed_minute = parse_hhmm(time.trim());
    let (parsed_date, parsed_minute) = match (parsed_date, parsed_minute) {
        (Ok(d), Ok(m)) => (d, m),
        _ => {
            errors.push(Issue::new(
                "INVALID_DATE_FORMAT",
                "Use YYYY-MM-DD and HH:MM",
            ));
            return ValidationReport::from_issues(errors, warnings);
        }
    };

    let now_local = ctx.now_local();
    let requested = parsed_date.and_time(
        chrono::NaiveTime::from_hms_opt(parsed_minute / 60, parsed_minute % 60, 0)
            .unwrap_or_default(),
    );
    if requested <= now_local {
        errors.push(Issue::new(
            "PAST_DATE_TIME",
            "The requested slot is in the past",
        ));
    }

    check_open_at(ctx, parsed_date, Some(parsed_minute), &mut errors);

    match ctx.stores.reservations.available_for_slot(
        ctx.owner_id(),
        date.trim(),
        time.trim(),
        guests,
        None,
    ) {
        Ok(tables) if tables.is_empty() => {
            errors.push(Issue::new(
                "NO_TABLES_AVAILABLE",
                "No table fits that slot",
            ));
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "availability query failed during validation");
            errors.push(Issue::new("DATABASE_ERROR", "Could not check availability"));
        }
    }

    ValidationReport::from_issues(errors, warnings)
}

/// May this customer still cancel the given order or reservation?
pub fn validate_cancellation_eligibility(
    ctx: &ToolContext,
    order_id: Option<&str>,
    reservation_id: Option<&str>,
) -> ValidationReport {
    let mut errors = Vec::new();
    let warnings = Vec::new();

    match (order_id, reservation_id) {
        (Some(order_id), _) => {
            let order = match ctx.stores.orders.get_for_customer(
                order_id,
                ctx.business_id(),
                &ctx.customer_phone,
            ) {
                Ok(o) => o,
                Err(e) => {
                    errors.push(Issue::new(e.code(), "No such order for this customer"));
                    return ValidationReport::from_issues(errors, warnings);
                }
            };
            if order.status == OrderStatus::Cart || order.status.is_terminal() {
                errors.push(Issue::new("NOT_CANCELLABLE", "This order can no longer be cancelled"));
                return ValidationReport::from_issues(errors, warnings);
            }
            let window = ctx
                .stores
                .orders
                .cancellation_window(order_id)
                .ok()
                .flatten()
                .unwrap_or(ctx.default_cancel_hours);
            if let Err(e) = check_cancellation(&order, window, Utc::now()) {
                let message = match &e {
                    OrderError::CancelDeadlinePassed => "The cancellation window has passed",
                    _ => "This order is not a future scheduled request",
                };
                errors.push(Issue::new(e.code(), message));
            }
        }
        (None, Some(reservation_id)) => {
            let reservation = match ctx.stores.reservations.get_for_customer(
                reservation_id,
                ctx.business_id(),
                &ctx.customer_phone,
            ) {
                Ok(r) => r,
                Err(e) => {
                    errors.push(Issue::new(e.code(), "No such reservation for this customer"));
                    return ValidationReport::from_issues(errors, warnings);
                }
            };
            if reservation.status != ReservationStatus::Confirmed {
                errors.push(Issue::new(
                    "NOT_CANCELLABLE",
                    "This reservation is no longer confirmed",
                ));
                return ValidationReport::from_issues(errors, warnings);
            }
            let slot_local = NaiveDate::parse_from_str(&reservation.reservation_date, "%Y-%m-%d")
                .ok()
                .zip(parse_hhmm(&reservation.reservation_time).ok())
                .map(|(d, m)| {
                    d.and_time(
                        chrono::NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap_or_default(),
                    )
                });
            match slot_local {
                Some(slot) if slot > ctx.now_local() => {}
                _ => errors.push(Issue::new(
                    "NOT_CANCELLABLE",
                    "The reservation time has already passed",
                )),
            }
        }
        (None, None) => errors.push(Issue::new(
            "INVALID_ARGUMENTS",
            "Provide an order_id or a reservation_id",
        )),
    }

    ValidationReport::from_issues(errors, warnings)
}

// ── helpers ───────────────────────────────────────────────────────────────────

fn minutes_of(t: chrono::NaiveTime) -> u32 {
    use chrono::Timelike;
    t.hour() * 60 + t.minute()
}

/// Push BUSINESS_CLOSED when the venue is closed on `date` (at `minute`, when
/// given).
fn check_open_at(ctx: &ToolContext, date: NaiveDate, minute: Option<u32>, errors: &mut Vec<Issue>) {
    let dow = date.weekday().num_days_from_monday() as u8;
    match effective_hours(&ctx.stores.catalog, ctx.owner_id(), ctx.business_id(), dow) {
        Ok(hours) => {
            let open = match minute {
                Some(m) => is_open_at(hours.as_ref(), m),
                None => hours.as_ref().map(|h| !h.is_closed).unwrap_or(false),
            };
            if !open {
                errors.push(Issue::new(
                    "BUSINESS_CLOSED",
                    format!("The business is closed at the requested time on {date}"),
                ));
            }
        }
        Err(e) => {
            warn!(error = %e, "opening hours lookup failed");
            errors.push(Issue::new("DATABASE_ERROR", "Could not read opening hours"));
        }
    }
}

/// Per-item advance-notice check for scheduled carts.
fn check_schedule_notice(
    ctx: &ToolContext,
    snapshot: &plaza_orders::types::CartSnapshot,
    at_utc: DateTime<Utc>,
    errors: &mut Vec<Issue>,
    warnings: &mut Vec<Issue>,
) {
    let notice = at_utc - Utc::now();
    for line in &snapshot.lines {
        let item = match ctx.stores.catalog.get_item(&line.item_id) {
            Ok(Some(i)) => i,
            _ => continue,
        };
        if item.min_schedule_hours > 0 && notice < Duration::hours(item.min_schedule_hours) {
            errors.push(Issue::new(
                "SCHEDULE_TOO_SOON",
                format!(
                    "'{}' needs at least {} hours notice",
                    item.name, item.min_schedule_hours
                ),
            ));
        }
        if !item.is_schedulable && item.min_schedule_hours == 0 {
            warnings.push(Issue::new(
                "NOT_SCHEDULABLE",
                format!("'{}' is normally ordered for right away", item.name),
            ));
        }
    }
}
