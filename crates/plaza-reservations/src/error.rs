use plaza_core::types::ReservationStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("Reservation not found: {0}")]
    NotFound(String),

    #[error("Customer name is required")]
    MissingCustomerName,

    #[error("That slot was just taken")]
    SlotTaken,

    #[error("No table fits the request")]
    NoTablesAvailable,

    #[error("Table {table_number} cannot seat {guests} guests")]
    CapacityMismatch { table_number: i64, guests: u32 },

    #[error("Illegal reservation transition: {from} -> {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Items can only change while the reservation is confirmed")]
    NotConfirmed,

    #[error("Invalid date or time: {0}")]
    InvalidDateTime(String),

    #[error(transparent)]
    Catalog(#[from] plaza_catalog::CatalogError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ReservationError {
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::NotFound(_) => "RESERVATION_NOT_FOUND",
            ReservationError::MissingCustomerName => "MISSING_CUSTOMER_NAME",
            ReservationError::SlotTaken => "SLOT_TAKEN",
            ReservationError::NoTablesAvailable => "NO_TABLES_AVAILABLE",
            ReservationError::CapacityMismatch { .. } => "CAPACITY_MISMATCH",
            ReservationError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ReservationError::NotConfirmed => "NOT_CONFIRMED",
            ReservationError::InvalidDateTime(_) => "INVALID_DATE_FORMAT",
            ReservationError::Catalog(e) => e.code(),
            ReservationError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReservationError>;
