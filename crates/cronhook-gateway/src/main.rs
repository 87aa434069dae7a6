use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use cronhook_core::config::CronhookConfig;
use cronhook_scheduler::{HttpExecutor, SystemClock, TriggerEngine};
use cronhook_store::ConfigStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod app;
mod auth;
mod http;

/// Multi-tenant cron service that calls a URL every time a job's schedule fires.
#[derive(Debug, Parser)]
#[command(name = "cronhook-gateway", version)]
struct Cli {
    /// Path to the TOML config file (default: $CRONHOOK_CONFIG or ./cronhook.toml).
    #[arg(long)]
    config: Option<String>,

    /// Override the listening port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cronhook_gateway=info,cronhook_scheduler=info,cronhook_store=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > CRONHOOK_CONFIG env > ./cronhook.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CRONHOOK_CONFIG").ok());
    let mut config = CronhookConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        CronhookConfig::default()
    });
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    // a missing or unreadable store starts empty; the first save creates it
    let store = ConfigStore::load(&config.store.path).unwrap_or_else(|e| {
        warn!(path = %config.store.path, "Config store not loaded ({}), starting empty", e);
        ConfigStore::new()
    });

    // hand the engine only jobs it accepts; autosave writes the cleaned form
    let mut doc = store.snapshot();
    let dropped = http::cron::normalize_document(&mut doc, Utc::now());
    if dropped > 0 {
        warn!(dropped, "invalid jobs removed from the config store");
    }
    store.replace_all(doc);

    let executor = Arc::new(HttpExecutor::new(config.http_timeout())?);
    let engine = TriggerEngine::new(executor, Arc::new(SystemClock));
    engine.load(&store.list_tenants_with_jobs());
    engine.start().await?;

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, store, engine));
    let router = app::build_router(state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let autosave = tokio::spawn(run_autosave(state.clone(), shutdown_rx));

    info!(
        commit = env!("CRONHOOK_GIT_SHA"),
        "Cronhook gateway listening on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop autosave, then the engine, then write whatever is left
    let _ = shutdown_tx.send(true);
    if let Err(e) = autosave.await {
        error!("autosave task failed: {e}");
    }
    if let Err(e) = state.engine.stop().await {
        warn!("engine stop: {e}");
    }
    save_store(&state);
    info!("Cronhook gateway stopped");
    Ok(())
}

/// Save the store every `auto_save_interval_secs` if it changed.
async fn run_autosave(state: Arc<app::AppState>, mut shutdown: watch::Receiver<bool>) {
    let secs = state.config.store.auto_save_interval_secs;
    if secs == 0 {
        info!("periodic config save disabled");
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(secs));
    // the first tick completes immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => save_store(&state),
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn save_store(state: &app::AppState) {
    let path = &state.config.store.path;
    match state.store.save_if_changed(path) {
        Ok(true) => info!(path = %path, "config saved"),
        Ok(false) => {}
        Err(e) => error!(path = %path, "config save failed: {e}"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping");
}
