use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use postbox::{
    config::Config,
    db,
    metrics::{CONTENT_TYPE, MetricsRegistry},
    server::{AppState, app_router},
};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

async fn sqlite_app(name: &str) -> Router {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "postbox-{name}-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));

    let mut cfg = Config::default();
    cfg.database.url = Some(format!("sqlite:{}", temp_path.display()));
    cfg.database.retry.max_attempts = 1;

    let database = db::connect(&cfg.database)
        .await
        .expect("sqlite database should initialize");
    let state = AppState::new(&cfg, &database, MetricsRegistry::local("app"));
    app_router(state)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request")
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(req).await.expect("request failed");
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let body = String::from_utf8(body.to_vec()).expect("response body was not utf-8");
    (status, body)
}

/// Value of the first exposition line starting with `series`, or zero.
fn sample_value(exposition: &str, series: &str) -> f64 {
    exposition
        .lines()
        .find_map(|line| line.strip_prefix(series))
        .map(|rest| rest.trim().parse().expect("sample value should be numeric"))
        .unwrap_or(0.0)
}

#[tokio::test]
async fn add_list_delete_round_trip() {
    let app = sqlite_app("crud").await;

    let (status, body) = send(&app, post_json("/add", r#"{"content":"hello"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"message saved successfully"}"#);

    let (status, body) = send(&app, get("/list")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"[{"id":1,"content":"hello"}]"#);

    let (status, body) = send(&app, post_json("/delete", r#"{"content":"hello"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        r#"{"status":"ok","detail":"message deleted successfully"}"#
    );

    let (status, body) = send(&app, get("/list")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn missing_or_empty_content_is_rejected_without_writing() {
    let app = sqlite_app("validation").await;

    for body in [r#"{"content":""}"#, "{}", "not-json", r#"{"content":42}"#] {
        for uri in ["/add", "/delete"] {
            let (status, resp) = send(&app, post_json(uri, body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} with {body}");
            assert_eq!(resp, r#"{"status":"error","detail":"content is required"}"#);
        }
    }

    let (_, body) = send(&app, get("/list")).await;
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn delete_removes_every_duplicate_and_tolerates_no_match() {
    let app = sqlite_app("duplicates").await;

    for content in ["dup", "keep", "dup"] {
        let (status, _) =
            send(&app, post_json("/add", &format!(r#"{{"content":"{content}"}}"#))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = send(&app, post_json("/delete", r#"{"content":"dup"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, post_json("/delete", r#"{"content":"absent"}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get("/list")).await;
    assert_eq!(body, r#"[{"id":2,"content":"keep"}]"#);
}

#[tokio::test]
async fn metrics_count_each_request_exactly_once() {
    let app = sqlite_app("metrics").await;
    let add_series =
        r#"app_http_requests_total{worker_id="unknown",method="POST",endpoint="/add",status="200"}"#;
    let add_latency_count =
        r#"app_http_requests_latency_seconds_count{worker_id="unknown",method="POST",endpoint="/add"}"#;

    let resp = app.clone().oneshot(get("/metrics")).await.expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).map(|v| v.as_bytes()),
        Some(CONTENT_TYPE.as_bytes())
    );
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    let before = String::from_utf8(body.to_vec()).expect("response body was not utf-8");

    let (status, _) = send(&app, post_json("/add", r#"{"content":"m"}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = send(&app, get("/metrics")).await;
    assert_eq!(
        sample_value(&after, add_series) - sample_value(&before, add_series),
        1.0
    );
    assert_eq!(
        sample_value(&after, add_latency_count) - sample_value(&before, add_latency_count),
        1.0
    );
    assert!(after.contains(r#"le="0.05""#));
    assert!(after.contains(r#"le="+Inf""#));
}

#[tokio::test]
async fn unmatched_paths_answer_404_and_are_labelled_unknown() {
    let app = sqlite_app("fallback").await;

    let (status, body) = send(&app, get("/definitely/not/here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"status":"error","detail":"not found"}"#);

    let (_, exposition) = send(&app, get("/metrics")).await;
    assert_eq!(
        sample_value(
            &exposition,
            r#"app_http_requests_total{worker_id="unknown",method="GET",endpoint="unknown",status="404"}"#
        ),
        1.0
    );
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let app = sqlite_app("request-id").await;

    let resp = app.clone().oneshot(get("/health")).await.expect("request failed");
    assert!(resp.headers().contains_key("x-request-id"));

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .header("x-request-id", "caller-supplied")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(
        resp.headers().get("x-request-id").map(|v| v.as_bytes()),
        Some(b"caller-supplied".as_slice())
    );
}

#[tokio::test]
async fn index_reports_environment() {
    let app = sqlite_app("index").await;

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).expect("index body is JSON");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["env"], "dev");
    assert!(json["message"].is_string());
}
