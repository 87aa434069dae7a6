use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
///
/// Execution failures are not represented here: a failed request is an
/// [`crate::Outcome::Failure`] recorded in the job's status, never an error
/// returned to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The expression could not be split into five or six fields.
    #[error("Malformed cron expression {expression:?}: {reason}")]
    MalformedExpression { expression: String, reason: String },

    /// A field holds a token outside its domain or one that is not a number.
    /// `index` is zero-based over the six canonical fields.
    #[error("Cron field {index} ({field}) out of range: {token:?}")]
    FieldOutOfRange {
        index: usize,
        field: &'static str,
        token: String,
    },

    /// The expression parsed but never matches a real calendar instant.
    #[error("Cron expression {expression:?} has no upcoming occurrence")]
    Unsatisfiable { expression: String },

    /// A job write named a tenant that was never added or has been removed.
    #[error("Tenant {tenant:?} is not registered")]
    UnknownTenant { tenant: String },

    #[error("Trigger engine is already running")]
    AlreadyRunning,

    #[error("Trigger engine is not running")]
    NotRunning,

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
