use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cronhook_core::CronhookError;
use cronhook_scheduler::SchedulerError;
use cronhook_store::StoreError;
use serde_json::json;
use tracing::error;

/// Error returned by every API handler, rendered as
/// `{"error": "<message>", "code": "<CODE>"}`.
#[derive(Debug)]
pub struct ApiError(pub CronhookError);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(CronhookError::InvalidRequest(msg.into()))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(CronhookError::NotFound(msg.into()))
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(CronhookError::AuthFailed(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CronhookError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            CronhookError::UserNotFound { .. } | CronhookError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CronhookError::InvalidCron(_)
            | CronhookError::InvalidRequest(_)
            | CronhookError::Serialization(_) => StatusCode::BAD_REQUEST,
            CronhookError::Config(_) | CronhookError::Io(_) | CronhookError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<CronhookError> for ApiError {
    fn from(e: CronhookError) -> Self {
        Self(e)
    }
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::MalformedExpression { .. }
            | SchedulerError::FieldOutOfRange { .. }
            | SchedulerError::Unsatisfiable { .. } => {
                Self(CronhookError::InvalidCron(e.to_string()))
            }
            SchedulerError::UnknownTenant { tenant } => {
                Self(CronhookError::UserNotFound { id: tenant })
            }
            SchedulerError::AlreadyRunning
            | SchedulerError::NotRunning
            | SchedulerError::Http(_) => Self(CronhookError::Internal(e.to_string())),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UserNotFound(id) => Self(CronhookError::UserNotFound { id }),
            StoreError::Serialization(e) => Self(CronhookError::Serialization(e)),
            StoreError::Io { .. } => Self(CronhookError::Internal(e.to_string())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), "request failed: {}", self.0);
        }
        (
            status,
            Json(json!({"error": self.0.to_string(), "code": self.0.code()})),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
