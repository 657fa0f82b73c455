use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Request metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Prefix of every exported metric name.
    /// Env: `METRICS_NAMESPACE`. Default: `app`.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Directory shared by all worker processes. When set, each worker
    /// publishes its samples there and `/metrics` merges every worker file.
    /// Env: `PROMETHEUS_MULTIPROC_DIR`.
    #[serde(default)]
    pub multiproc_dir: Option<PathBuf>,

    /// How often the local samples are republished to the shared directory.
    /// Env: `METRICS_FLUSH_INTERVAL_MS`. Default: `1000`.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Ceiling on distinct label combinations kept by one process.
    /// Env: `METRICS_MAX_SERIES`. Default: `10000`.
    #[serde(default = "default_max_series")]
    pub max_series: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            multiproc_dir: None,
            flush_interval_ms: default_flush_interval_ms(),
            max_series: default_max_series(),
        }
    }
}

impl MetricsConfig {
    /// The shared directory, ignoring an empty path.
    pub fn shared_dir(&self) -> Option<&PathBuf> {
        self.multiproc_dir
            .as_ref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

fn default_namespace() -> String {
    "app".to_string()
}

fn default_flush_interval_ms() -> u64 {
    1_000
}

fn default_max_series() -> usize {
    10_000
}
