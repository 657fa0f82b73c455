use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use super::deserialize_opt_string_lax;

/// Worker label used when no `WORKER_ID` override is configured.
pub const UNKNOWN_WORKER: &str = "unknown";

/// HTTP server configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// HTTP server listen address (e.g., "0.0.0.0", "127.0.0.1").
    /// TOML: `server.listen_addr`. Env: `LISTEN_ADDR`. Default: `0.0.0.0`.
    #[serde(default = "default_listen_ip")]
    pub listen_addr: IpAddr,

    /// HTTP server listen port.
    /// TOML: `server.listen_port`. Env: `LISTEN_PORT`. Default: `8000`.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Log level for tracing subscriber initialization (e.g., "error", "warn", "info", "debug", "trace").
    /// TOML: `server.loglevel`. Env: `LOGLEVEL`. Default: `info`.
    #[serde(default = "default_loglevel")]
    pub loglevel: String,

    /// Deployment label echoed by `GET /`.
    /// TOML: `server.app_env`. Env: `APP_ENV`. Default: `dev`.
    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Worker identity used as the `worker_id` metric label.
    /// Env: `WORKER_ID` (the process manager usually sets it to the worker pid).
    #[serde(default, deserialize_with = "deserialize_opt_string_lax")]
    pub worker_id: Option<String>,

    /// Runtime worker threads for this process.
    /// TOML: `server.worker_threads`. Env: `WORKER_THREADS`. Default: `2`.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Per-request timeout in seconds.
    /// TOML: `server.request_timeout_secs`. Env: `REQUEST_TIMEOUT_SECS`. Default: `30`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound (exclusive) of the random delay `GET /` sleeps to emulate work.
    /// `0` disables the delay.
    /// TOML: `server.simulated_work_max_ms`. Env: `SIMULATED_WORK_MAX_MS`. Default: `0`.
    #[serde(default)]
    pub simulated_work_max_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_ip(),
            listen_port: default_listen_port(),
            loglevel: default_loglevel(),
            app_env: default_app_env(),
            worker_id: None,
            worker_threads: default_worker_threads(),
            request_timeout_secs: default_request_timeout_secs(),
            simulated_work_max_ms: 0,
        }
    }
}

impl ServerConfig {
    /// Resolved worker label; blank overrides count as unset.
    pub fn worker_id(&self) -> &str {
        self.worker_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_WORKER)
    }
}

/// Default IP address for the HTTP server listen address.
fn default_listen_ip() -> IpAddr {
    Ipv4Addr::new(0, 0, 0, 0).into()
}

/// Default port for the HTTP server.
fn default_listen_port() -> u16 {
    8000
}

fn default_loglevel() -> String {
    "info".to_string()
}

fn default_app_env() -> String {
    "dev".to_string()
}

fn default_worker_threads() -> usize {
    2
}

fn default_request_timeout_secs() -> u64 {
    30
}
