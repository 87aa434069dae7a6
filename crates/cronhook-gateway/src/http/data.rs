use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::require_user;
use crate::http::error::{ApiError, ApiResult};

/// GET /data/{user}/keys
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    require_user(&state, &user)?;
    Ok(Json(state.store.data_keys(&user).unwrap_or_default()))
}

/// GET /data/{user}/{key}
pub async fn get_value(
    State(state): State<Arc<AppState>>,
    Path((user, key)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    require_user(&state, &user)?;
    state
        .store
        .get_data(&user, &key)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("key {key}")))
}

/// PUT /data/{user}/{key}: body is any JSON value.
pub async fn put_value(
    State(state): State<Arc<AppState>>,
    Path((user, key)): Path<(String, String)>,
    Json(value): Json<Value>,
) -> ApiResult<Json<Value>> {
    require_user(&state, &user)?;
    state.store.set_data(&user, &key, value)?;
    Ok(Json(json!({"key": key, "saved": true})))
}

/// DELETE /data/{user}/{key}
pub async fn delete_value(
    State(state): State<Arc<AppState>>,
    Path((user, key)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    require_user(&state, &user)?;
    if state.store.delete_data(&user, &key) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("key {key}")))
    }
}
