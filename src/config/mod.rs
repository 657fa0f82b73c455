mod database;
mod metrics;
mod server;

pub use database::{Backoff, DatabaseConfig, REDACTED, RetryConfig};
pub use metrics::MetricsConfig;
pub use server::{ServerConfig, UNKNOWN_WORKER};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// HTTP server settings (see `server` table in config.toml).
    #[serde(default)]
    pub server: ServerConfig,

    /// Relational store settings (see `database` table in config.toml).
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Request metrics settings (see `metrics` table in config.toml).
    #[serde(default)]
    pub metrics: MetricsConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variables holding numbers, booleans or enum names, and the
/// key each one sets. Figment parses these values before deserialization.
const ENV_KEYS: &[(&str, &str)] = &[
    ("LISTEN_ADDR", "server.listen_addr"),
    ("LISTEN_PORT", "server.listen_port"),
    ("LOGLEVEL", "server.loglevel"),
    ("WORKER_THREADS", "server.worker_threads"),
    ("REQUEST_TIMEOUT_SECS", "server.request_timeout_secs"),
    ("SIMULATED_WORK_MAX_MS", "server.simulated_work_max_ms"),
    ("POSTGRES_PORT", "database.port"),
    ("DATABASE_REQUIRED", "database.required"),
    ("DB_MAX_CONNECTIONS", "database.max_connections"),
    ("DB_ACQUIRE_TIMEOUT_MS", "database.acquire_timeout_ms"),
    ("DB_MAX_RETRIES", "database.retry.max_attempts"),
    ("DB_RETRY_DELAY_MS", "database.retry.delay_ms"),
    ("DB_RETRY_BACKOFF", "database.retry.backoff"),
    ("DB_RETRY_MAX_DELAY_MS", "database.retry.max_delay_ms"),
    ("PROMETHEUS_MULTIPROC_DIR", "metrics.multiproc_dir"),
    ("METRICS_NAMESPACE", "metrics.namespace"),
    ("METRICS_FLUSH_INTERVAL_MS", "metrics.flush_interval_ms"),
    ("METRICS_MAX_SERIES", "metrics.max_series"),
];

/// Environment variables taken verbatim. `007` stays `"007"` and `[pw]`
/// stays `"[pw]"`, which figment's value parser would otherwise rewrite.
const TEXT_ENV_KEYS: &[(&str, &str)] = &[
    ("APP_ENV", "server.app_env"),
    ("WORKER_ID", "server.worker_id"),
    ("POSTGRES_USER", "database.user"),
    ("POSTGRES_PASSWORD", "database.password"),
    ("POSTGRES_HOST", "database.host"),
    ("POSTGRES_DB", "database.name"),
    ("DATABASE_URL", "database.url"),
];

impl Config {
    /// Builds a Figment that merges defaults, an optional config TOML file and
    /// the environment (highest precedence).
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        };
        text_env_values()
            .into_iter()
            .fold(figment.merge(env_provider()), |figment, (path, value)| {
                figment.merge(Serialized::default(path, value))
            })
    }

    /// Loads and validates the configuration. Read once at process start.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg: Self = Self::figment().extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Copy safe to log: the database password never leaves the process.
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if !shown.database.password.is_empty() {
            shown.database.password = REDACTED.to_string();
        }
        if shown.database.url_override().is_some() {
            shown.database.url = Some(shown.database.redacted_target());
        }
        shown
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "server.worker_threads must be at least 1".to_string(),
            ));
        }
        if self.database.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "database.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.metrics.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "metrics.flush_interval_ms must be positive".to_string(),
            ));
        }
        if !is_metric_name(&self.metrics.namespace) {
            return Err(ConfigError::Invalid(format!(
                "metrics.namespace {:?} is not a valid metric name prefix",
                self.metrics.namespace
            )));
        }
        Ok(())
    }
}

fn env_provider() -> Env {
    Env::raw().filter_map(|key| {
        ENV_KEYS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| (*path).into())
    })
}

/// Text settings present in the environment, matched case-insensitively.
fn text_env_values() -> Vec<(&'static str, String)> {
    let vars: Vec<(String, String)> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();
    TEXT_ENV_KEYS
        .iter()
        .filter_map(|(name, path)| {
            vars.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| (*path, value.clone()))
        })
        .collect()
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Accepts strings, and bare numbers or booleans written in `config.toml`
/// for fields that are text (passwords, worker pids).
fn deserialize_string_lax<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;

    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(serde::de::Error::custom(
            "expected a string, number or boolean",
        )),
    }
}

fn deserialize_opt_string_lax<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(deserializer)?;

    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(serde::de::Error::custom(
            "expected a string, number or boolean",
        )),
    }
}
