use plaza_core::types::OrderStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Cart line not found: {0}")]
    LineNotFound(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Delivery type is not set")]
    MissingDeliveryType,

    #[error("Delivery address is required for delivery orders")]
    MissingAddress,

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Illegal status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Insufficient stock for item {item_id}")]
    InsufficientStock { item_id: String },

    #[error("The cancellation window for this order has passed")]
    CancelDeadlinePassed,

    #[error("Order is not a future scheduled request")]
    NotCancellable,

    #[error("Delivery price can only change while accepted with delivery")]
    DeliveryPriceNotAmendable,

    #[error("Order {0} is not in a terminal state")]
    NotArchivable(String),

    #[error(transparent)]
    Catalog(#[from] plaza_catalog::CatalogError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl OrderError {
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::NotFound(_) => "ORDER_NOT_FOUND",
            OrderError::LineNotFound(_) => "LINE_NOT_FOUND",
            OrderError::EmptyCart => "EMPTY_CART",
            OrderError::MissingDeliveryType => "MISSING_DELIVERY_TYPE",
            OrderError::MissingAddress => "MISSING_ADDRESS",
            OrderError::InvalidQuantity => "INVALID_QUANTITY",
            OrderError::InvalidTransition { .. } => "INVALID_TRANSITION",
            OrderError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            OrderError::CancelDeadlinePassed => "CANCEL_DEADLINE_PASSED",
            OrderError::NotCancellable => "NOT_CANCELLABLE",
            OrderError::DeliveryPriceNotAmendable => "DELIVERY_PRICE_NOT_AMENDABLE",
            OrderError::NotArchivable(_) => "NOT_ARCHIVABLE",
            OrderError::Catalog(e) => e.code(),
            OrderError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;
