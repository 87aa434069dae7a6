use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use cronhook_core::JobSpec;
use cronhook_scheduler::{Job, JobStatus};
use cronhook_store::Document;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth::require_user;
use crate::http::error::{ApiError, ApiResult};

/// A persisted job plus its live status, if it has one.
#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: JobSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

/// Check the required fields and parse the expression.
pub(crate) fn validate_job(spec: &JobSpec) -> ApiResult<Job> {
    if spec.id.trim().is_empty() {
        return Err(ApiError::bad_request("job id must not be empty"));
    }
    if spec.url.trim().is_empty() {
        return Err(ApiError::bad_request("job url must not be empty"));
    }
    Ok(Job::from_spec(spec)?)
}

/// Bring a document read from disk into the form the API itself writes.
///
/// Expressions are rewritten canonically. Jobs that fail validation are
/// dropped, as is any repeated ID within a tenant after its first entry. An
/// active job with no occurrence after `now` is stored inactive. Returns the
/// number of jobs dropped.
pub(crate) fn normalize_document(doc: &mut Document, now: DateTime<Utc>) -> usize {
    let mut dropped = 0;
    for (user, data) in doc.iter_mut() {
        let mut seen = HashSet::new();
        data.cron.retain_mut(|spec| {
            if !seen.insert(spec.id.clone()) {
                warn!(user = %user, job_id = %spec.id, "dropping duplicate job");
                dropped += 1;
                return false;
            }
            match validate_job(spec) {
                Ok(mut job) => {
                    if job.active && job.schedule.next_after(now).is_err() {
                        warn!(
                            user = %user,
                            job_id = %spec.id,
                            "no upcoming occurrence, stored inactive"
                        );
                        job.active = false;
                    }
                    *spec = job.to_spec();
                    true
                }
                Err(e) => {
                    warn!(user = %user, job_id = %spec.id, "dropping invalid job: {}", e.0);
                    dropped += 1;
                    false
                }
            }
        });
    }
    dropped
}

// ── Job list ──────────────────────────────────────────────────────────────────

/// GET /cron/{user}/jobs
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> ApiResult<Json<Vec<JobSpec>>> {
    require_user(&state, &user)?;
    Ok(Json(state.store.jobs(&user).unwrap_or_default()))
}

/// POST /cron/{user}/jobs: create a job, or replace the one with that ID.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(spec): Json<JobSpec>,
) -> ApiResult<(StatusCode, Json<JobSpec>)> {
    require_user(&state, &user)?;
    let _writes = state.writes.lock().await;
    let spec = upsert(&state, &user, spec)?;
    Ok((StatusCode::CREATED, Json(spec)))
}

/// PUT /cron/{user}/jobs: replace the user's whole job list.
pub async fn replace_jobs(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    Json(specs): Json<Vec<JobSpec>>,
) -> ApiResult<Json<Vec<JobSpec>>> {
    require_user(&state, &user)?;
    let jobs = specs
        .iter()
        .map(validate_job)
        .collect::<ApiResult<Vec<Job>>>()?;
    let canonical: Vec<JobSpec> = jobs.iter().map(Job::to_spec).collect();

    let _writes = state.writes.lock().await;
    state.engine.registry().replace_tenant(&user, jobs)?;
    state.store.replace_jobs(&user, canonical.clone())?;
    info!(user = %user, jobs = canonical.len(), "job list replaced");
    Ok(Json(canonical))
}

// ── Single job ────────────────────────────────────────────────────────────────

/// GET /cron/{user}/job/{id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path((user, id)): Path<(String, String)>,
) -> ApiResult<Json<JobView>> {
    require_user(&state, &user)?;
    let job = state
        .store
        .job(&user, &id)
        .ok_or_else(|| ApiError::not_found(format!("job {id}")))?;
    let status = state.engine.registry().status(&user, &id);
    Ok(Json(JobView { job, status }))
}

/// PUT /cron/{user}/job/{id}: wholesale update; the path ID wins over any
/// ID in the body.
pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Path((user, id)): Path<(String, String)>,
    Json(mut spec): Json<JobSpec>,
) -> ApiResult<Json<JobSpec>> {
    require_user(&state, &user)?;
    spec.id = id;
    let _writes = state.writes.lock().await;
    Ok(Json(upsert(&state, &user, spec)?))
}

/// DELETE /cron/{user}/job/{id}
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path((user, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    require_user(&state, &user)?;
    let _writes = state.writes.lock().await;
    if !state.store.delete_job(&user, &id) {
        return Err(ApiError::not_found(format!("job {id}")));
    }
    state.engine.registry().remove(&user, &id);
    info!(user = %user, job_id = %id, "job deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /cron/{user}/job/{id}/on
pub async fn job_on(
    state: State<Arc<AppState>>,
    path: Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    set_job_active(state, path, true).await
}

/// GET /cron/{user}/job/{id}/off
pub async fn job_off(
    state: State<Arc<AppState>>,
    path: Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    set_job_active(state, path, false).await
}

async fn set_job_active(
    State(state): State<Arc<AppState>>,
    Path((user, id)): Path<(String, String)>,
    active: bool,
) -> ApiResult<Json<Value>> {
    require_user(&state, &user)?;
    let _writes = state.writes.lock().await;
    if !state.engine.registry().set_active(&user, &id, active)? {
        return Err(ApiError::not_found(format!("job {id}")));
    }
    state.store.set_job_active(&user, &id, active);
    Ok(Json(json!({"id": id, "action": action(active), "active": active})))
}

// ── Bulk activation ───────────────────────────────────────────────────────────

/// GET /cron/{user}/on
pub async fn all_on(state: State<Arc<AppState>>, path: Path<String>) -> ApiResult<Json<Value>> {
    set_all_active(state, path, true).await
}

/// GET /cron/{user}/off
pub async fn all_off(state: State<Arc<AppState>>, path: Path<String>) -> ApiResult<Json<Value>> {
    set_all_active(state, path, false).await
}

async fn set_all_active(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
    active: bool,
) -> ApiResult<Json<Value>> {
    require_user(&state, &user)?;
    let _writes = state.writes.lock().await;
    if state.store.jobs(&user).unwrap_or_default().is_empty() {
        return Ok(Json(json!({
            "user": user,
            "action": action(active),
            "message": "no jobs to update",
        })));
    }

    let registry = state.engine.registry();
    let count = registry.set_all_active(&user, active);
    state.store.set_all_jobs_active(&user, active);
    // jobs the registry refused to activate stay inactive in the store too
    for job in registry.list(&user).into_iter().filter(|j| j.active != active) {
        state.store.set_job_active(&user, &job.id, job.active);
    }
    info!(user = %user, active, count, "bulk activation");
    Ok(Json(json!({
        "user": user,
        "action": action(active),
        "count": count,
        "success": true,
    })))
}

fn action(active: bool) -> &'static str {
    if active {
        "on"
    } else {
        "off"
    }
}

/// Validate, schedule, then persist. The registry goes first so that an
/// unsatisfiable schedule is rejected before anything is written. Callers
/// hold `AppState::writes`.
pub(crate) fn upsert(state: &AppState, user: &str, spec: JobSpec) -> ApiResult<JobSpec> {
    let job = validate_job(&spec)?;
    let canonical = job.to_spec();
    let outcome = state.engine.registry().upsert(user, job)?;
    state.store.upsert_job(user, canonical.clone())?;
    info!(user = %user, job_id = %canonical.id, ?outcome, "job saved");
    Ok(canonical)
}
