use axum::{
    routing::{delete, get},
    Router,
};
use cronhook_core::config::CronhookConfig;
use cronhook_scheduler::TriggerEngine;
use cronhook_store::ConfigStore;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::http::{admin, cron, data, health, status};

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: CronhookConfig,
    /// Persisted users, jobs and key-value data.
    pub store: ConfigStore,
    /// Live schedule; its registry mirrors the jobs in `store`.
    pub engine: TriggerEngine,
    /// Held by every handler that changes jobs or tenants, across both the
    /// registry write and the store write.
    pub writes: Mutex<()>,
}

impl AppState {
    pub fn new(config: CronhookConfig, store: ConfigStore, engine: TriggerEngine) -> Self {
        Self {
            config,
            store,
            engine,
            writes: Mutex::new(()),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // ── admin ──
        .route(
            "/admin/{key}/users",
            get(admin::list_users).post(admin::create_user),
        )
        .route("/admin/{key}/users/{user}", delete(admin::delete_user))
        .route(
            "/admin/{key}/config",
            get(admin::get_config).put(admin::put_config),
        )
        .route("/admin/{key}/reload", get(admin::reload).post(admin::reload))
        // ── status ──
        .route("/status/{user}", get(status::user_status))
        // ── jobs ──
        .route(
            "/cron/{user}/jobs",
            get(cron::list_jobs)
                .post(cron::create_job)
                .put(cron::replace_jobs),
        )
        .route(
            "/cron/{user}/job/{id}",
            get(cron::get_job)
                .put(cron::update_job)
                .delete(cron::delete_job),
        )
        .route("/cron/{user}/job/{id}/on", get(cron::job_on))
        .route("/cron/{user}/job/{id}/off", get(cron::job_off))
        .route("/cron/{user}/on", get(cron::all_on))
        .route("/cron/{user}/off", get(cron::all_off))
        // ── key-value data ──
        .route("/data/{user}/keys", get(data::list_keys))
        .route(
            "/data/{user}/{key}",
            get(data::get_value)
                .put(data::put_value)
                .delete(data::delete_value),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
