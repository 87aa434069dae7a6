use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_SUPER_ADMIN_KEY: &str = "super_admin_key";
pub const DEFAULT_STORE_PATH: &str = "/config/config.json";
pub const DEFAULT_AUTO_SAVE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Plain environment variables honoured for compatibility with existing
/// container deployments, mapped onto their nested config keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("PORT", "gateway.port"),
    ("SUPER_ADMIN_KEY", "gateway.super_admin_key"),
    ("CONFIG_FILE_PATH", "store.path"),
    ("AUTO_SAVE_INTERVAL", "store.auto_save_interval_secs"),
];

/// Top-level config (cronhook.toml + CRONHOOK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronhookConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Key expected in the second path segment of every `/admin` route.
    #[serde(default = "default_super_admin_key")]
    pub super_admin_key: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            super_admin_key: default_super_admin_key(),
        }
    }
}

/// Where tenants, jobs and per-tenant data are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Seconds between change-gated snapshots of the store to disk.
    /// Zero disables the periodic save; the final save on shutdown still runs.
    #[serde(default = "default_auto_save_interval_secs")]
    pub auto_save_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            auto_save_interval_secs: default_auto_save_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on a single outbound job request.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_super_admin_key() -> String {
    DEFAULT_SUPER_ADMIN_KEY.to_string()
}
fn default_store_path() -> String {
    DEFAULT_STORE_PATH.to_string()
}
fn default_auto_save_interval_secs() -> u64 {
    DEFAULT_AUTO_SAVE_INTERVAL_SECS
}
fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl CronhookConfig {
    /// Load config from a TOML file with environment overrides.
    ///
    /// Later sources win:
    ///   1. built-in defaults
    ///   2. the TOML file (explicit path, else `./cronhook.toml`)
    ///   3. `CRONHOOK_*` variables, nested with `__`
    ///      (e.g. `CRONHOOK_GATEWAY__SUPER_ADMIN_KEY`)
    ///   4. the plain `PORT`, `SUPER_ADMIN_KEY`, `CONFIG_FILE_PATH`
    ///      and `AUTO_SAVE_INTERVAL` variables
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CronhookConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CRONHOOK_").split("__"))
            .merge(legacy_env())
            .extract()
            .map_err(|e| crate::error::CronhookError::Config(e.to_string()))?;

        tracing::debug!(path = %path, port = config.gateway.port, "config loaded");
        Ok(config)
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scheduler.http_timeout_secs)
    }
}

fn legacy_env() -> Env {
    let names: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, nested)| (*nested).into())
            .unwrap_or_else(|| key.into())
    })
}

fn default_config_path() -> String {
    "cronhook.toml".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_file_or_env() {
        Jail::expect_with(|_jail| {
            let config = CronhookConfig::load(Some("missing.toml")).unwrap();
            assert_eq!(config.gateway.port, 8080);
            assert_eq!(config.gateway.super_admin_key, "super_admin_key");
            assert_eq!(config.store.path, "/config/config.json");
            assert_eq!(config.store.auto_save_interval_secs, 60);
            assert_eq!(config.scheduler.http_timeout_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn toml_then_prefixed_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "cronhook.toml",
                r#"
                [gateway]
                port = 9000
                [store]
                path = "/tmp/jobs.json"
                "#,
            )?;
            jail.set_env("CRONHOOK_SCHEDULER__HTTP_TIMEOUT_SECS", "5");
            jail.set_env("CRONHOOK_GATEWAY__BIND", "127.0.0.1");

            let config = CronhookConfig::load(None).unwrap();
            assert_eq!(config.gateway.port, 9000);
            assert_eq!(config.gateway.bind, "127.0.0.1");
            assert_eq!(config.store.path, "/tmp/jobs.json");
            assert_eq!(config.http_timeout(), std::time::Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn legacy_variables_override_everything() {
        Jail::expect_with(|jail| {
            jail.create_file("cronhook.toml", "[gateway]\nport = 9000\n")?;
            jail.set_env("PORT", "7070");
            jail.set_env("CONFIG_FILE_PATH", "/data/config.json");
            jail.set_env("AUTO_SAVE_INTERVAL", "15");
            jail.set_env("SUPER_ADMIN_KEY", "s3cret");

            let config = CronhookConfig::load(None).unwrap();
            assert_eq!(config.gateway.port, 7070);
            assert_eq!(config.store.path, "/data/config.json");
            assert_eq!(config.store.auto_save_interval_secs, 15);
            assert_eq!(config.gateway.super_admin_key, "s3cret");
            Ok(())
        });
    }
}
