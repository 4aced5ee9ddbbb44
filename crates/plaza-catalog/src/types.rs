use plaza_core::types::{ItemAvailability, ItemType};
use serde::{Deserialize, Serialize};

/// A sellable good or bookable service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub business_id: String,
    /// Branch that carries the item, or null for business-wide items.
    pub owner_user_id: Option<String>,
    pub menu_id: Option<String>,
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub item_type: ItemType,
    pub price: f64,
    pub cost: Option<f64>,
    pub preparation_time_minutes: Option<i64>,
    /// Service length; null for goods.
    pub duration_minutes: Option<i64>,
    pub is_schedulable: bool,
    /// Minimum advance notice for scheduling this item.
    pub min_schedule_hours: i64,
    /// Overrides the business-level cancellation window when set.
    pub cancelable_before_hours: Option<i64>,
    /// Null means unlimited stock.
    pub stock_quantity: Option<i64>,
    pub availability: ItemAvailability,
    /// Free-form note shown alongside `availability` (e.g. "back on Friday").
    pub availability_status: Option<String>,
    /// Weekdays the item can be ordered (0 = Monday). Empty means every day.
    pub days_available: Vec<u8>,
    pub available_from: Option<String>,
    pub available_to: Option<String>,
    pub times_ordered: i64,
    pub times_delivered: i64,
    pub deleted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Item {
    /// Customer-facing visibility: hidden and soft-deleted items are never
    /// surfaced by search or addable to a cart.
    pub fn is_visible(&self) -> bool {
        self.deleted_at.is_none() && self.availability != ItemAvailability::Hidden
    }

    pub fn is_orderable(&self) -> bool {
        self.is_visible() && self.availability == ItemAvailability::Available
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Menu {
    pub id: String,
    pub business_id: String,
    pub owner_user_id: Option<String>,
    pub name: String,
    pub is_active: bool,
    pub created_at: String,
}

/// Weekly opening hours row. Branch rows shadow business rows for the same
/// weekday; lookup falls back business-wide when no branch row exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningHours {
    pub owner_id: String,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u8,
    /// "HH:MM", 24-hour.
    pub open_time: Option<String>,
    pub close_time: Option<String>,
    pub is_closed: bool,
    /// Cutoff after which no new orders are taken for the day.
    pub last_order_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiningTable {
    pub id: String,
    pub business_id: String,
    pub owner_user_id: String,
    /// Unique within the owner; also the auto-selection tie-break.
    pub table_number: i64,
    pub min_seats: u32,
    pub max_seats: u32,
    pub position_label: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl DiningTable {
    pub fn fits(&self, guests: u32) -> bool {
        self.min_seats <= guests && guests <= self.max_seats
    }
}
