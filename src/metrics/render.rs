use std::fmt::Write;

use super::LATENCY_BUCKETS;
use super::sample::Merged;

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render merged samples in Prometheus text exposition format (0.0.4).
pub(crate) fn render(namespace: &str, merged: &Merged) -> String {
    let mut out = String::new();

    let requests = format!("{namespace}_http_requests_total");
    let _ = writeln!(out, "# HELP {requests} Total number of HTTP requests received");
    let _ = writeln!(out, "# TYPE {requests} counter");
    for (labels, value) in &merged.requests {
        let _ = writeln!(
            out,
            "{requests}{{worker_id=\"{}\",method=\"{}\",endpoint=\"{}\",status=\"{}\"}} {value}",
            escape_label(&labels.worker_id),
            escape_label(&labels.method),
            escape_label(&labels.endpoint),
            labels.status,
        );
    }

    let latency = format!("{namespace}_http_requests_latency_seconds");
    let _ = writeln!(out, "# HELP {latency} Request latency");
    let _ = writeln!(out, "# TYPE {latency} histogram");
    for (labels, hist) in &merged.latencies {
        let label_str = format!(
            "worker_id=\"{}\",method=\"{}\",endpoint=\"{}\"",
            escape_label(&labels.worker_id),
            escape_label(&labels.method),
            escape_label(&labels.endpoint),
        );
        for (le, count) in LATENCY_BUCKETS.iter().zip(&hist.buckets) {
            let _ = writeln!(out, "{latency}_bucket{{{label_str},le=\"{le}\"}} {count}");
        }
        let _ = writeln!(
            out,
            "{latency}_bucket{{{label_str},le=\"+Inf\"}} {}",
            hist.count
        );
        let _ = writeln!(out, "{latency}_sum{{{label_str}}} {}", hist.sum);
        let _ = writeln!(out, "{latency}_count{{{label_str}}} {}", hist.count);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::sample::{HistogramSample, LatencyLabels, RequestLabels, Snapshot};

    #[test]
    fn empty_registry_still_declares_both_families() {
        let text = render("app", &Merged::default());
        assert_eq!(
            text,
            "# HELP app_http_requests_total Total number of HTTP requests received\n\
             # TYPE app_http_requests_total counter\n\
             # HELP app_http_requests_latency_seconds Request latency\n\
             # TYPE app_http_requests_latency_seconds histogram\n"
        );
    }

    #[test]
    fn histogram_lines_follow_bucket_order() {
        let mut hist = HistogramSample::default();
        hist.buckets = vec![0, 1, 1, 1, 1, 1, 1, 1];
        hist.count = 1;
        hist.sum = 0.08;
        let merged = Merged::from(Snapshot {
            requests: vec![],
            latencies: vec![(
                LatencyLabels {
                    worker_id: "w".to_string(),
                    method: "GET".to_string(),
                    endpoint: "/".to_string(),
                },
                hist,
            )],
        });

        let text = render("app", &merged);
        let labels = r#"worker_id="w",method="GET",endpoint="/""#;
        assert!(text.contains(&format!(
            "app_http_requests_latency_seconds_bucket{{{labels},le=\"0.05\"}} 0\n\
             app_http_requests_latency_seconds_bucket{{{labels},le=\"0.1\"}} 1\n"
        )));
        assert!(text.contains(&format!(
            "app_http_requests_latency_seconds_bucket{{{labels},le=\"5\"}} 1\n\
             app_http_requests_latency_seconds_bucket{{{labels},le=\"+Inf\"}} 1\n\
             app_http_requests_latency_seconds_sum{{{labels}}} 0.08\n\
             app_http_requests_latency_seconds_count{{{labels}}} 1\n"
        )));
    }

    #[test]
    fn label_values_are_escaped() {
        let merged = Merged::from(Snapshot {
            requests: vec![(
                RequestLabels {
                    worker_id: "w\"1".to_string(),
                    method: "GET".to_string(),
                    endpoint: "a\\b".to_string(),
                    status: 404,
                },
                1,
            )],
            latencies: vec![],
        });

        let text = render("app", &merged);
        assert!(text.contains(
            r#"app_http_requests_total{worker_id="w\"1",method="GET",endpoint="a\\b",status="404"} 1"#
        ));
    }
}
