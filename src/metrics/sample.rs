use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{LATENCY_BUCKETS, MetricsError};

/// Series key of the request counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestLabels {
    pub worker_id: String,
    pub method: String,
    pub endpoint: String,
    pub status: u16,
}

/// Series key of the latency histogram.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LatencyLabels {
    pub worker_id: String,
    pub method: String,
    pub endpoint: String,
}

/// One histogram series. `buckets[i]` counts observations `<= LATENCY_BUCKETS[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSample {
    pub buckets: Vec<u64>,
    pub count: u64,
    pub sum: f64,
}

impl Default for HistogramSample {
    fn default() -> Self {
        Self {
            buckets: vec![0; LATENCY_BUCKETS.len()],
            count: 0,
            sum: 0.0,
        }
    }
}

impl HistogramSample {
    fn absorb(&mut self, other: &HistogramSample) {
        for (mine, theirs) in self.buckets.iter_mut().zip(&other.buckets) {
            *mine += theirs;
        }
        self.count += other.count;
        self.sum += other.sum;
    }
}

/// Point-in-time copy of one worker's samples; the unit exchanged between workers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub requests: Vec<(RequestLabels, u64)>,
    pub latencies: Vec<(LatencyLabels, HistogramSample)>,
}

impl Snapshot {
    /// Rejects snapshots written with a different bucket layout.
    pub fn check(&self) -> Result<(), MetricsError> {
        match self
            .latencies
            .iter()
            .find(|(_, h)| h.buckets.len() != LATENCY_BUCKETS.len())
        {
            Some((labels, h)) => Err(MetricsError::Malformed(format!(
                "histogram for {} {} has {} buckets, expected {}",
                labels.method,
                labels.endpoint,
                h.buckets.len(),
                LATENCY_BUCKETS.len()
            ))),
            None => Ok(()),
        }
    }
}

/// Union of several snapshots; identical series are summed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub requests: BTreeMap<RequestLabels, u64>,
    pub latencies: BTreeMap<LatencyLabels, HistogramSample>,
}

impl Merged {
    pub fn absorb(&mut self, snapshot: Snapshot) {
        for (labels, value) in snapshot.requests {
            *self.requests.entry(labels).or_default() += value;
        }
        for (labels, hist) in snapshot.latencies {
            self.latencies.entry(labels).or_default().absorb(&hist);
        }
    }
}

impl From<Snapshot> for Merged {
    fn from(snapshot: Snapshot) -> Self {
        let mut merged = Merged::default();
        merged.absorb(snapshot);
        merged
    }
}
