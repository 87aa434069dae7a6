use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use cronhook_store::{store::read_document, Document};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;
use crate::auth::require_super_admin;
use crate::http::cron::{normalize_document, validate_job};
use crate::http::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub user: String,
}

/// GET /admin/{key}/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    require_super_admin(&state, &key)?;
    Ok(Json(state.store.tenants()))
}

/// POST /admin/{key}/users: 201 when created, 200 when it already existed.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<CreateUser>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_super_admin(&state, &key)?;
    let user = body.user.trim();
    if user.is_empty() {
        return Err(ApiError::bad_request("user name must not be empty"));
    }

    let _writes = state.writes.lock().await;
    state.engine.registry().add_tenant(user);
    let created = state.store.create_tenant(user);
    let status = if created {
        info!(user = %user, "user created");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(json!({"user": user, "created": created}))))
}

/// DELETE /admin/{key}/users/{user}: removes the user, its data and every
/// one of its scheduled jobs.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path((key, user)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    require_super_admin(&state, &key)?;
    let _writes = state.writes.lock().await;
    if !state.store.delete_tenant(&user) {
        return Err(ApiError::not_found(format!("user {user}")));
    }
    let removed_jobs = state.engine.registry().remove_tenant(&user);
    info!(user = %user, removed_jobs, "user deleted");
    Ok(Json(json!({"user": user, "removed_jobs": removed_jobs})))
}

/// GET /admin/{key}/config: the whole persisted document.
pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<Document>> {
    require_super_admin(&state, &key)?;
    Ok(Json(state.store.snapshot()))
}

/// PUT /admin/{key}/config: replace the document and rebuild the engine.
///
/// Every job is validated first and stored with its canonical expression;
/// one bad job rejects the whole document.
pub async fn put_config(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(mut doc): Json<Document>,
) -> ApiResult<Json<Value>> {
    require_super_admin(&state, &key)?;

    let now = Utc::now();
    for (user, data) in doc.iter_mut() {
        for spec in data.cron.iter_mut() {
            let job = validate_job(spec)
                .map_err(|e| ApiError::bad_request(format!("{user}/{}: {}", spec.id, e.0)))?;
            if job.active {
                job.schedule
                    .next_after(now)
                    .map_err(|e| ApiError::bad_request(format!("{user}/{}: {e}", spec.id)))?;
            }
            *spec = job.to_spec();
        }
    }

    let _writes = state.writes.lock().await;
    state.store.replace_all(doc);
    let jobs = state
        .engine
        .reload(&state.store.list_tenants_with_jobs())
        .await?;
    let users = state.store.tenants().len();
    info!(users, jobs, "config replaced");
    Ok(Json(json!({"users": users, "jobs": jobs})))
}

/// GET /admin/{key}/reload: re-read the config file and rebuild the engine.
///
/// The file is normalized the same way as at startup, so the store never
/// holds a job the engine would refuse.
pub async fn reload(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<Value>> {
    require_super_admin(&state, &key)?;

    let mut doc = read_document(std::path::Path::new(&state.config.store.path))?;
    let dropped = normalize_document(&mut doc, Utc::now());
    let _writes = state.writes.lock().await;
    state.store.replace_all(doc);
    let jobs = state
        .engine
        .reload(&state.store.list_tenants_with_jobs())
        .await?;
    info!(jobs, dropped, path = %state.config.store.path, "config reloaded from disk");
    Ok(Json(json!({"reloaded": true, "jobs": jobs, "dropped": dropped})))
}
