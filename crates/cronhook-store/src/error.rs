use thiserror::Error;

/// Store-layer errors. Kept separate from `CronhookError` so the gateway can
/// map them to HTTP statuses without coupling layers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config document: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
