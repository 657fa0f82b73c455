use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::aggregate::{Aggregator, LocalOnly, SharedDirectory};
use super::render::render;
use super::sample::{HistogramSample, LatencyLabels, RequestLabels, Snapshot};
use super::MetricsError;
use crate::config::MetricsConfig;

const BUCKET_COUNT: usize = 8;

/// Upper bounds (seconds) of the latency histogram buckets; `+Inf` is implicit.
pub const LATENCY_BUCKETS: [f64; BUCKET_COUNT] = [0.05, 0.1, 0.3, 0.5, 0.7, 1.0, 2.0, 5.0];

struct AtomicHistogram {
    buckets: [AtomicU64; BUCKET_COUNT],
    count: AtomicU64,
    sum_nanos: AtomicU64,
}

impl Default for AtomicHistogram {
    fn default() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum_nanos: AtomicU64::new(0),
        }
    }
}

impl AtomicHistogram {
    fn observe(&self, duration: Duration) {
        let seconds = duration.as_secs_f64();
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);

        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);

        // Cumulative: every bucket whose bound covers the value.
        for (bound, bucket) in LATENCY_BUCKETS.iter().zip(&self.buckets) {
            if seconds <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn sample(&self) -> HistogramSample {
        HistogramSample {
            buckets: self
                .buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
            count: self.count.load(Ordering::Relaxed),
            sum: self.sum_nanos.load(Ordering::Relaxed) as f64 / 1e9,
        }
    }
}

/// Per-process request metrics.
///
/// Cheap to clone; all clones share the same series. Safe for concurrent
/// increments from any number of tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    namespace: String,
    max_series: usize,
    requests: DashMap<RequestLabels, AtomicU64>,
    latencies: DashMap<LatencyLabels, AtomicHistogram>,
    aggregator: Arc<dyn Aggregator>,
}

impl MetricsRegistry {
    pub fn new(
        namespace: impl Into<String>,
        max_series: usize,
        aggregator: Arc<dyn Aggregator>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                namespace: namespace.into(),
                max_series,
                requests: DashMap::new(),
                latencies: DashMap::new(),
                aggregator,
            }),
        }
    }

    /// Registry that reports this process only.
    pub fn local(namespace: impl Into<String>) -> Self {
        Self::new(namespace, usize::MAX, Arc::new(LocalOnly))
    }

    /// Picks the aggregator from configuration: a shared directory when one
    /// is configured, local-only otherwise.
    pub fn from_config(cfg: &MetricsConfig) -> Self {
        let aggregator: Arc<dyn Aggregator> = match cfg.shared_dir() {
            Some(dir) => {
                info!(dir = %dir.display(), "merging metrics across workers via shared directory");
                Arc::new(SharedDirectory::for_this_process(dir))
            }
            None => Arc::new(LocalOnly),
        };
        Self::new(cfg.namespace.clone(), cfg.max_series, aggregator)
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Counts one finished request. Never fails; problems are logged.
    pub fn record_request(&self, worker_id: &str, method: &str, endpoint: &str, status: u16) {
        let labels = RequestLabels {
            worker_id: worker_id.to_string(),
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            status,
        };
        if let Err(error) = self.try_record_request(labels) {
            warn!(%error, method, endpoint, status, "dropping request sample");
        }
    }

    /// Observes one request latency. Never fails; problems are logged.
    pub fn record_latency(&self, worker_id: &str, method: &str, endpoint: &str, duration: Duration) {
        let labels = LatencyLabels {
            worker_id: worker_id.to_string(),
            method: method.to_string(),
            endpoint: endpoint.to_string(),
        };
        if let Err(error) = self.try_record_latency(labels, duration) {
            warn!(%error, method, endpoint, "dropping latency sample");
        }
    }

    fn try_record_request(&self, labels: RequestLabels) -> Result<(), MetricsError> {
        if let Some(counter) = self.inner.requests.get(&labels) {
            counter.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.ensure_capacity()?;
        self.inner
            .requests
            .entry(labels)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn try_record_latency(
        &self,
        labels: LatencyLabels,
        duration: Duration,
    ) -> Result<(), MetricsError> {
        if let Some(hist) = self.inner.latencies.get(&labels) {
            hist.observe(duration);
            return Ok(());
        }
        self.ensure_capacity()?;
        self.inner
            .latencies
            .entry(labels)
            .or_default()
            .observe(duration);
        Ok(())
    }

    fn ensure_capacity(&self) -> Result<(), MetricsError> {
        let series = self.inner.requests.len() + self.inner.latencies.len();
        if series >= self.inner.max_series {
            return Err(MetricsError::CardinalityExceeded {
                limit: self.inner.max_series,
            });
        }
        Ok(())
    }

    /// Copy of this process's samples.
    pub fn local_snapshot(&self) -> Snapshot {
        Snapshot {
            requests: self
                .inner
                .requests
                .iter()
                .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
                .collect(),
            latencies: self
                .inner
                .latencies
                .iter()
                .map(|r| (r.key().clone(), r.value().sample()))
                .collect(),
        }
    }

    /// Current aggregate in text exposition format.
    ///
    /// Touches the filesystem when a shared directory is configured; call it
    /// from a blocking context.
    pub fn snapshot(&self) -> Vec<u8> {
        let merged = self.inner.aggregator.collect(self.local_snapshot());
        render(&self.inner.namespace, &merged).into_bytes()
    }

    /// Pushes the local samples to the aggregator. Errors are logged.
    pub fn publish(&self) {
        match self.inner.aggregator.publish(&self.local_snapshot()) {
            Ok(()) => debug!("metrics snapshot published"),
            Err(error) => warn!(%error, "failed to publish metrics snapshot"),
        }
    }

    /// Periodically republishes local samples when the aggregator shares
    /// state with other workers. Returns `None` for local-only registries.
    pub fn spawn_flusher(&self, every: Duration) -> Option<JoinHandle<()>> {
        if !self.inner.aggregator.is_shared() {
            return None;
        }
        let registry = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let registry = registry.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || registry.publish()).await {
                    warn!(error = %e, "metrics flusher task failed");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_local(registry: &MetricsRegistry) -> String {
        String::from_utf8(registry.snapshot()).expect("exposition is utf-8")
    }

    #[test]
    fn counters_materialize_on_first_use() {
        let registry = MetricsRegistry::local("app");
        registry.record_request("w1", "GET", "/list", 200);
        registry.record_request("w1", "GET", "/list", 200);
        registry.record_request("w1", "POST", "/add", 400);

        let text = render_local(&registry);
        assert!(text.contains(
            r#"app_http_requests_total{worker_id="w1",method="GET",endpoint="/list",status="200"} 2"#
        ));
        assert!(text.contains(
            r#"app_http_requests_total{worker_id="w1",method="POST",endpoint="/add",status="400"} 1"#
        ));
    }

    #[test]
    fn latency_lands_in_cumulative_buckets() {
        let registry = MetricsRegistry::local("app");
        registry.record_latency("w1", "GET", "/", Duration::from_millis(200));
        registry.record_latency("w1", "GET", "/", Duration::from_secs(7));

        let snapshot = registry.local_snapshot();
        let (_, hist) = &snapshot.latencies[0];
        // 0.2s is above 0.05 and 0.1, inside 0.3 and every larger bound.
        assert_eq!(hist.buckets, vec![0, 0, 1, 1, 1, 1, 1, 1]);
        assert_eq!(hist.count, 2);
        assert!((hist.sum - 7.2).abs() < 1e-6);
    }

    #[test]
    fn zero_duration_counts_in_every_bucket() {
        let registry = MetricsRegistry::local("app");
        registry.record_latency("w1", "GET", "/", Duration::ZERO);

        let snapshot = registry.local_snapshot();
        assert_eq!(snapshot.latencies[0].1.buckets, vec![1; LATENCY_BUCKETS.len()]);
    }

    #[test]
    fn series_ceiling_drops_new_label_sets_but_keeps_existing_ones() {
        let registry = MetricsRegistry::new("app", 1, Arc::new(LocalOnly));
        registry.record_request("w1", "GET", "/", 200);
        registry.record_request("w1", "GET", "/list", 200);
        registry.record_request("w1", "GET", "/", 200);

        let snapshot = registry.local_snapshot();
        assert_eq!(snapshot.requests.len(), 1);
        assert_eq!(snapshot.requests[0].1, 2);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let registry = MetricsRegistry::local("app");
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let registry = registry.clone();
                scope.spawn(move || {
                    for _ in 0..1_000 {
                        registry.record_request("w1", "GET", "/", 200);
                    }
                });
            }
        });

        let snapshot = registry.local_snapshot();
        assert_eq!(snapshot.requests[0].1, 8_000);
    }

    #[test]
    fn local_only_registry_has_no_flusher() {
        let registry = MetricsRegistry::local("app");
        assert!(registry.spawn_flusher(Duration::from_secs(1)).is_none());
    }
}
