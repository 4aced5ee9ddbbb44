use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Identity(#[from] plaza_identity::IdentityError),

    #[error(transparent)]
    Session(#[from] plaza_sessions::SessionError),

    #[error("LLM provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    #[error("Turn deadline exceeded")]
    TurnTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
