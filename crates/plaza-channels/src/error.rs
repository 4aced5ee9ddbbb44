use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{platform} API error ({status}): {message}")]
    Api {
        platform: String,
        status: u16,
        message: String,
    },

    #[error("No sender registered for platform {0}")]
    NoSender(String),

    #[error("Missing channel credentials: {0}")]
    MissingCredentials(String),

    #[error("Malformed API response: {0}")]
    Parse(String),
}

impl ChannelError {
    /// Worth retrying? Connection trouble and 5xx yes; auth and 4xx no.
    pub fn is_transient(&self) -> bool {
        match self {
            ChannelError::Http(e) => e.is_timeout() || e.is_connect(),
            ChannelError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
