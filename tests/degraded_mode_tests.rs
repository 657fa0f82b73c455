use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use postbox::{
    config::Config,
    db::Database,
    metrics::MetricsRegistry,
    server::{AppState, app_router},
};
use tower::ServiceExt;

fn degraded_app() -> Router {
    let cfg = Config::default();
    let database = Database::unavailable("connection refused");
    assert!(!database.is_available());
    app_router(AppState::new(&cfg, &database, MetricsRegistry::local("app")))
}

async fn call(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    (
        status,
        String::from_utf8(body.to_vec()).expect("response body was not utf-8"),
    )
}

#[tokio::test]
async fn liveness_and_metrics_survive_without_a_database() {
    let app = degraded_app();

    for uri in ["/", "/health", "/healthz", "/metrics"] {
        let (status, _) = call(&app, "GET", uri, "").await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }
    let (_, body) = call(&app, "GET", "/health", "").await;
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn crud_answers_structured_500_without_leaking_the_cause() {
    let app = degraded_app();
    let expected = r#"{"status":"error","detail":"database unavailable"}"#;

    let (status, body) = call(&app, "GET", "/list", "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, expected);

    let (status, body) = call(&app, "POST", "/add", r#"{"content":"x"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, expected);

    let (status, body) = call(&app, "POST", "/delete", r#"{"content":"x"}"#).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, expected);
}

#[tokio::test]
async fn validation_still_runs_before_storage() {
    let app = degraded_app();

    let (status, body) = call(&app, "POST", "/add", r#"{"content":""}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"status":"error","detail":"content is required"}"#);
}
