use serde::{Deserialize, Serialize};
use url::Url;

use super::{deserialize_opt_string_lax, deserialize_string_lax};

/// Placeholder substituted for the password whenever a connection target is logged.
pub const REDACTED: &str = "****";

/// Relational store configuration.
///
/// The connection target is assembled from `user`, `password`, `host`, `port`
/// and `name` unless `url` overrides it. `sqlite:` URLs select the embedded
/// SQLite backend, which is what local runs and the test-suite use.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Env: `POSTGRES_USER`. Default: `postgres`.
    #[serde(default = "default_user", deserialize_with = "deserialize_string_lax")]
    pub user: String,

    /// Env: `POSTGRES_PASSWORD`. Never logged.
    #[serde(default, deserialize_with = "deserialize_string_lax")]
    pub password: String,

    /// Env: `POSTGRES_HOST`. Default: `localhost`.
    #[serde(default = "default_host")]
    pub host: String,

    /// Env: `POSTGRES_PORT`. Default: `5432`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Env: `POSTGRES_DB`. Default: `postgres`.
    #[serde(default = "default_name", deserialize_with = "deserialize_string_lax")]
    pub name: String,

    /// Full connection URL; takes precedence over the discrete fields.
    /// Env: `DATABASE_URL`.
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub url: Option<String>,

    /// Refuse to start when the database cannot be initialized.
    /// With `false` the service starts degraded and CRUD endpoints answer 500.
    /// Env: `DATABASE_REQUIRED`. Default: `true`.
    #[serde(default = "default_required")]
    pub required: bool,

    /// Env: `DB_MAX_CONNECTIONS`. Default: `5`.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a handler waits for a pooled connection.
    /// Env: `DB_ACQUIRE_TIMEOUT_MS`. Default: `5000`.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Startup retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            password: String::new(),
            host: default_host(),
            port: default_port(),
            name: default_name(),
            url: None,
            required: default_required(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// The URL override, if one is set and non-blank.
    pub fn url_override(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Connection target suitable for logs: the password is always replaced.
    pub fn redacted_target(&self) -> String {
        match self.url_override() {
            Some(raw) => redact_url(raw),
            None => {
                let secret = if self.password.is_empty() { "" } else { REDACTED };
                let userinfo = if secret.is_empty() {
                    self.user.clone()
                } else {
                    format!("{}:{secret}", self.user)
                };
                format!(
                    "postgres://{userinfo}@{}:{}/{}",
                    self.host, self.port, self.name
                )
            }
        }
    }
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which carry no password.
                let _ = url.set_password(Some(REDACTED));
            }
            url.to_string()
        }
        Err(_) => "<unparseable database url>".to_string(),
    }
}

/// Shape of the delay between initialization attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Bounded retry policy applied while the database comes up.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total connection attempts, including the first one.
    /// Env: `DB_MAX_RETRIES`. Default: `10`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the next attempt (the initial delay for `exponential`).
    /// Env: `DB_RETRY_DELAY_MS`. Default: `1000`.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Env: `DB_RETRY_BACKOFF`. Default: `fixed`.
    #[serde(default)]
    pub backoff: Backoff,

    /// Delay ceiling for `exponential`.
    /// Env: `DB_RETRY_MAX_DELAY_MS`. Default: `10000`.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            backoff: Backoff::default(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_name() -> String {
    "postgres".to_string()
}

fn default_required() -> bool {
    true
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> usize {
    10
}

fn default_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}
