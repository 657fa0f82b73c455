use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;
use crate::metrics::MetricsRegistry;
use crate::server::middleware::{stamp_start, tag_endpoint, track_metrics};
use crate::server::routes::{basic, messages};
use crate::service::MessageService;

use axum::{
    Router,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode, Version, header::USER_AGENT},
    middleware::{self, Next},
    response::Response,
};
use base64::Engine as _;
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn format_http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

#[derive(Clone)]
pub struct AppState {
    pub messages: MessageService,
    pub metrics: MetricsRegistry,
    pub app_env: Arc<str>,
    pub worker_id: Arc<str>,
    pub simulated_work_max_ms: u64,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(cfg: &Config, db: &Database, metrics: MetricsRegistry) -> Self {
        Self {
            messages: MessageService::new(db.store()),
            metrics,
            app_env: Arc::from(cfg.server.app_env.as_str()),
            worker_id: Arc::from(cfg.server.worker_id()),
            simulated_work_max_ms: cfg.server.simulated_work_max_ms,
            request_timeout: Duration::from_secs(cfg.server.request_timeout_secs),
        }
    }
}

async fn not_found_handler() -> AppError {
    AppError::NotFound
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let path = uri.path();
    let protocol = format_http_version(version);

    if status.is_server_error() {
        error!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else if status.is_client_error() {
        warn!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    } else {
        info!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(),
            request_id,
            method.as_str(),
            protocol,
            path,
            latency_ms,
            user_agent
        );
    }

    resp
}

pub fn app_router(state: AppState) -> Router {
    let routes = Router::new()
        .merge(basic::router())
        .merge(messages::router());
    instrument(routes, state)
}

/// Layer order, outermost first: access log, start stamp, metrics, then per
/// route endpoint tagging, panic catching and the request timeout. Timeouts
/// and panics therefore still carry their route label.
pub(crate) fn instrument(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .route_layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.request_timeout,
        ))
        .route_layer(CatchPanicLayer::new())
        .route_layer(middleware::from_fn(tag_endpoint))
        .fallback(not_found_handler)
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, track_metrics))
        .layer(middleware::from_fn(stamp_start))
        .layer(middleware::from_fn(access_log))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_request_ids_are_url_safe_and_fixed_length() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(id, generate_request_id());
    }

    #[test]
    fn http_versions_render_as_protocol_names() {
        assert_eq!(format_http_version(Version::HTTP_11), "HTTP/1.1");
        assert_eq!(format_http_version(Version::HTTP_2), "HTTP/2");
    }
}
