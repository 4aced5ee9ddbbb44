use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Principal not found: {0}")]
    NotFound(String),

    #[error("No {platform} integration registered for phone id {external_id}")]
    IntegrationNotFound {
        platform: String,
        external_id: String,
    },

    #[error("Principal {0} does not belong to a business")]
    NoBusiness(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl IdentityError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::NotFound(_) => "PRINCIPAL_NOT_FOUND",
            IdentityError::IntegrationNotFound { .. } => "INTEGRATION_NOT_FOUND",
            IdentityError::NoBusiness(_) => "NO_BUSINESS",
            IdentityError::PermissionDenied(_) => "PERMISSION_DENIED",
            IdentityError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
