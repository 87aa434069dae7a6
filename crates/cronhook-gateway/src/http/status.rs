use axum::{
    extract::{Path, State},
    Json,
};
use cronhook_scheduler::JobStatus;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::require_user;
use crate::http::error::ApiResult;

/// GET /status/{user}: execution status of every job that has been active,
/// keyed by job ID.
pub async fn user_status(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> ApiResult<Json<BTreeMap<String, JobStatus>>> {
    require_user(&state, &user)?;
    Ok(Json(state.engine.registry().all_status(&user)))
}
