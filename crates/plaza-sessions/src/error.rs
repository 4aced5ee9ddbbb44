use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {0} is closed")]
    Closed(String),

    #[error("Session {id} is not in state {expected}")]
    WrongState { id: String, expected: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "SESSION_NOT_FOUND",
            SessionError::Closed(_) => "SESSION_CLOSED",
            SessionError::WrongState { .. } => "SESSION_WRONG_STATE",
            SessionError::Database(_) => "DATABASE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
