use plaza_core::types::{DeliveryType, OrderStatus, PaymentStatus, Platform, RequestType};
use serde::{Deserialize, Serialize};

/// Sentinel prefix on the notes column that marks an `orders` row as a cart.
/// User notes, when present, follow the sentinel.
pub const CART_SENTINEL: &str = "__cart__";

/// Identifies the single cart a customer can have with an owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CartKey {
    pub business_id: String,
    pub owner_user_id: String,
    pub customer_phone: String,
}

impl CartKey {
    pub fn new(business_id: &str, owner_user_id: &str, customer_phone: &str) -> Self {
        Self {
            business_id: business_id.to_string(),
            owner_user_id: owner_user_id.to_string(),
            customer_phone: customer_phone.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub business_id: String,
    /// Branch or business handling the order.
    pub user_id: String,
    pub customer_phone_number: String,
    pub customer_name: Option<String>,
    pub delivery_type: Option<DeliveryType>,
    pub status: OrderStatus,
    pub request_type: RequestType,
    /// RFC 3339 UTC; set only on scheduled requests.
    pub scheduled_for: Option<String>,
    pub subtotal: f64,
    pub delivery_price: f64,
    /// Invariant: always `subtotal + delivery_price`.
    pub total: f64,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub location_address: Option<String>,
    pub language_used: Option<String>,
    pub order_source: Platform,
    pub first_response_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Order {
    /// The customer-entered part of the notes, sentinel stripped.
    pub fn user_notes(&self) -> Option<&str> {
        match self.notes.as_deref() {
            Some(n) => {
                let stripped = n.strip_prefix(CART_SENTINEL).unwrap_or(n);
                if stripped.is_empty() {
                    None
                } else {
                    Some(stripped)
                }
            }
            None => None,
        }
    }

    pub fn is_cart(&self) -> bool {
        self.status == OrderStatus::Cart
    }
}

/// A line on an order. Prices are frozen at snapshot time and never
/// recomputed from the catalog afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub price_at_time: f64,
    pub cost_at_time: Option<f64>,
    pub name_at_time: String,
    pub notes: Option<String>,
}

/// Append-only status log row. The last row always matches the order's
/// current status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub order_id: String,
    pub status: OrderStatus,
    pub changed_by: String,
    pub changed_at: String,
}

/// A cart plus its lines, as handed to the engine for prompt context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub order: Order,
    pub lines: Vec<OrderItem>,
}

/// Immutable cold-store document for an archived order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLog {
    pub order_id: String,
    pub business_id: String,
    pub user_id: String,
    pub customer_phone_number: String,
    pub customer_name: Option<String>,
    pub delivery_type: Option<DeliveryType>,
    pub final_status: OrderStatus,
    pub request_type: RequestType,
    pub scheduled_for: Option<String>,
    pub subtotal: f64,
    pub delivery_price: f64,
    pub total: f64,
    pub payment_method: Option<String>,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub location_address: Option<String>,
    pub language_used: Option<String>,
    pub order_source: Platform,
    pub items: Vec<ArchivedItem>,
    pub status_timeline: Vec<TimelineEntry>,
    pub first_response_at: Option<String>,
    pub completed_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub created_at: String,
    pub archived_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedItem {
    pub item_id: String,
    pub name_at_time: String,
    pub quantity: i64,
    pub price_at_time: f64,
    pub cost_at_time: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub changed_by: String,
    pub changed_at: String,
}

/// Round money values to cents after arithmetic.
pub fn round_money(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
