//! Request instrumentation.
//!
//! Three cooperating layers:
//! - [`stamp_start`] (outermost) records when the request arrived;
//! - [`track_metrics`] records outcome and latency once the response exists;
//! - [`tag_endpoint`] (route layer) names the matched route on the response,
//!   since the outer layers run before routing and never see `MatchedPath`.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

use crate::metrics::MetricsRegistry;
use crate::server::router::AppState;

/// Endpoint label for requests that matched no route.
pub const UNKNOWN_ENDPOINT: &str = "unknown";

/// Arrival time of a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(pub Instant);

/// Route template that served a response, e.g. `/add`.
#[derive(Debug, Clone)]
pub struct Endpoint(pub Arc<str>);

pub async fn stamp_start(mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(RequestStart(Instant::now()));
    next.run(req).await
}

pub async fn tag_endpoint(req: Request, next: Next) -> Response {
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| Arc::<str>::from(p.as_str()));
    let mut resp = next.run(req).await;
    if let Some(endpoint) = endpoint {
        resp.extensions_mut().insert(Endpoint(endpoint));
    }
    resp
}

pub async fn track_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let started = req.extensions().get::<RequestStart>().map(|s| s.0);
    let method = req.method().clone();

    let resp = next.run(req).await;

    // Missing stamp means a layer-ordering bug; report zero rather than fail.
    let elapsed = started.map_or(Duration::ZERO, |t| t.elapsed());
    let endpoint = resp
        .extensions()
        .get::<Endpoint>()
        .map_or(UNKNOWN_ENDPOINT, |e| &*e.0);

    record_outcome(
        &state.metrics,
        &state.worker_id,
        method.as_str(),
        endpoint,
        resp.status().as_u16(),
        elapsed,
    );
    resp
}

/// Metrics must never change what the client receives.
fn record_outcome(
    metrics: &MetricsRegistry,
    worker_id: &str,
    method: &str,
    endpoint: &str,
    status: u16,
    elapsed: Duration,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        metrics.record_request(worker_id, method, endpoint, status);
        metrics.record_latency(worker_id, method, endpoint, elapsed);
    }));
    if outcome.is_err() {
        error!(method, endpoint, status, "metrics recording panicked; response unaffected");
    }
}
