use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Menu not found: {0}")]
    MenuNotFound(String),

    #[error("Invalid time value: {0}")]
    InvalidTime(String),

    #[error("Table capacity is invalid: min {min} > max {max}")]
    InvalidCapacity { min: u32, max: u32 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl CatalogError {
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::ItemNotFound(_) => "ITEM_NOT_FOUND",
            CatalogError::TableNotFound(_) => "TABLE_NOT_FOUND",
            CatalogError::MenuNotFound(_) => "MENU_NOT_FOUND",
            CatalogError::InvalidTime(_) => "INVALID_TIME",
            CatalogError::InvalidCapacity { .. } => "INVALID_CAPACITY",
            CatalogError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
