use crate::metrics::CONTENT_TYPE;
use crate::server::router::AppState;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::error;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
}

async fn index_handler(State(state): State<AppState>) -> Json<Value> {
    if state.simulated_work_max_ms > 0 {
        let ms = rand::random_range(0..state.simulated_work_max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
    Json(json!({
        "status": "ok",
        "message": "Hello from postbox!",
        "env": &*state.app_env,
    }))
}

/// Liveness only; never touches the database.
async fn health_handler() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let registry = state.metrics.clone();
    match tokio::task::spawn_blocking(move || registry.snapshot()).await {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "metrics snapshot task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
