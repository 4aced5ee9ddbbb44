use thiserror::Error;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Ticket {0} is closed")]
    Closed(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl TicketError {
    pub fn code(&self) -> &'static str {
        match self {
            TicketError::NotFound(_) => "TICKET_NOT_FOUND",
            TicketError::Closed(_) => "TICKET_CLOSED",
            TicketError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, TicketError>;
