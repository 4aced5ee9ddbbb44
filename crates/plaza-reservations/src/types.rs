use plaza_core::types::{ReservationStatus, ReservationType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub business_user_id: String,
    pub owner_user_id: String,
    /// Null for appointment reservations.
    pub table_id: Option<String>,
    pub customer_phone_number: String,
    pub customer_name: String,
    /// "YYYY-MM-DD".
    pub reservation_date: String,
    /// "HH:MM", minute precision. The slot exclusion key.
    pub reservation_time: String,
    pub number_of_guests: Option<u32>,
    pub reservation_type: ReservationType,
    pub status: ReservationStatus,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A pre-ordered item attached to a confirmed reservation. Prices snapshot
/// at add time, like order lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationItem {
    pub id: String,
    pub reservation_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub price_at_time: f64,
    pub name_at_time: String,
    pub notes: Option<String>,
}

/// Creation request, as assembled by the engine or the admin API.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub business_user_id: String,
    pub owner_user_id: String,
    pub customer_phone_number: String,
    pub customer_name: Option<String>,
    pub reservation_date: String,
    pub reservation_time: String,
    pub number_of_guests: Option<u32>,
    pub reservation_type: ReservationType,
    /// Explicit table choice; auto-selection when absent.
    pub table_number: Option<i64>,
    /// Case-insensitive substring filter over `position_label`.
    pub position_pref: Option<String>,
    pub notes: Option<String>,
}
