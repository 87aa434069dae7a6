use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronhookError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CronhookError {
    /// Short error code string included in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CronhookError::Config(_) => "CONFIG_ERROR",
            CronhookError::AuthFailed(_) => "AUTH_FAILED",
            CronhookError::UserNotFound { .. } => "USER_NOT_FOUND",
            CronhookError::InvalidCron(_) => "INVALID_CRON",
            CronhookError::InvalidRequest(_) => "INVALID_REQUEST",
            CronhookError::NotFound(_) => "NOT_FOUND",
            CronhookError::Serialization(_) => "SERIALIZATION_ERROR",
            CronhookError::Io(_) => "IO_ERROR",
            CronhookError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CronhookError>;
