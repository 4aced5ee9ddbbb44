use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Order(#[from] plaza_orders::OrderError),

    #[error(transparent)]
    Session(#[from] plaza_sessions::SessionError),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
