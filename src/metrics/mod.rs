//! Request metrics.
//!
//! Layout:
//! - `registry.rs`: per-process counters and latency histograms (lock-free atomics in `DashMap`)
//! - `sample.rs`: serializable snapshots and their merge rules
//! - `aggregate.rs`: how snapshots from several worker processes are combined
//! - `render.rs`: Prometheus text exposition output
//!
//! Recording never fails the caller: errors are logged and dropped.

mod aggregate;
mod registry;
mod render;
mod sample;

pub use aggregate::{Aggregator, LocalOnly, SharedDirectory};
pub use registry::{LATENCY_BUCKETS, MetricsRegistry};
pub use sample::{HistogramSample, LatencyLabels, Merged, RequestLabels, Snapshot};

use thiserror::Error as ThisError;

/// `Content-Type` of the exposition served by `/metrics`.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, ThisError)]
pub enum MetricsError {
    #[error("series limit of {limit} reached; dropping new label set")]
    CardinalityExceeded { limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed worker snapshot: {0}")]
    Malformed(String),
}
