//! HTTP transport behavior driven in-process against `changeset_server::router`,
//! with no real socket involved: health checks, the NDJSON `/mcp` tool-call
//! endpoint, and bearer-auth enforcement once tokens are configured.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use changeset_common::config::AppConfig;
use changeset_core::git_collab::NullCommitLookup;
use changeset_core::lifecycle::WorkflowEngine;
use changeset_core::pagination::Pagination;
use changeset_core::template::DefaultTemplateRenderer;
use changeset_core::test_collab::NoTestSummary;
use changeset_e2e::TestConfig;
use changeset_server::AppState;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn engine(root: std::path::PathBuf) -> Arc<WorkflowEngine> {
    Arc::new(WorkflowEngine {
        root,
        api_version: "1.0".to_string(),
        template_renderer: Arc::new(DefaultTemplateRenderer::default()),
        commit_lookup: Arc::new(NullCommitLookup),
        test_summary: Arc::new(NoTestSummary),
        pagination: Pagination::default(),
    })
}

#[tokio::test]
async fn healthz_and_readyz_need_no_auth() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.working_directory = dir.path().to_path_buf();
    let state = AppState::new(engine(dir.path().to_path_buf()), config);
    let app = changeset_server::router(state);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn mcp_endpoint_runs_a_tool_call_as_ndjson() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.working_directory = dir.path().to_path_buf();
    let state = AppState::new(engine(dir.path().to_path_buf()), config);
    let app = changeset_server::router(state);

    let body = serde_json::json!({
        "tool": "change.open",
        "input": { "title": "Add caching", "slug": "add-caching", "owner": "carol" },
    });
    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))))
        .body(Body::from(body.to_string()))
        .expect("request");

    let resp = app.oneshot(req).await.expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3, "expected start/result/end NDJSON lines, got: {text}");
    assert!(lines[0].contains("\"start\""));
    assert!(lines[1].contains("\"result\""));
    assert!(lines[2].contains("\"end\""));
}

#[tokio::test]
async fn mcp_endpoint_rejects_requests_without_a_recognized_bearer_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.working_directory = dir.path().to_path_buf();
    config.auth_tokens = vec!["s3cret".to_string()];
    let state = AppState::new(engine(dir.path().to_path_buf()), config);
    let app = changeset_server::router(state);

    let body = serde_json::json!({ "tool": "changes.active", "input": {} });
    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))))
        .body(Body::from(body.to_string()))
        .expect("request");

    let resp = app.oneshot(req).await.expect("response");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn oversize_result_yields_response_too_large() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.working_directory = dir.path().to_path_buf();
    config.response_limits.max_response_kb = 0;
    let state = AppState::new(engine(dir.path().to_path_buf()), config);
    let app = changeset_server::router(state);

    let body = serde_json::json!({ "tool": "changes.active", "input": {} });
    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))))
        .body(Body::from(body.to_string()))
        .expect("request");

    let resp = app.oneshot(req).await.expect("response");
    assert_eq!(resp.status(), StatusCode::OK); // NDJSON envelope itself is 200; error is in the "error" line
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(text.contains("RESPONSE_TOO_LARGE"));
}

#[tokio::test]
async fn sse_endpoint_streams_a_terminal_result_event() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.working_directory = dir.path().to_path_buf();
    let state = AppState::new(engine(dir.path().to_path_buf()), config);
    let app = changeset_server::router(state);

    let body = serde_json::json!({
        "tool": "change.open",
        "input": { "title": "Add caching", "slug": "add-caching", "owner": "carol" },
    });
    let req = Request::builder()
        .method("POST")
        .uri("/sse")
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))))
        .body(Body::from(body.to_string()))
        .expect("request");

    let resp = app.oneshot(req).await.expect("response");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").expect("content-type"),
        "text/event-stream"
    );
    let bytes = resp.into_body().collect().await.expect("body").to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert_eq!(
        text.matches("event: result").count(),
        1,
        "expected exactly one terminal result event, got: {text}"
    );
    assert!(text.contains("\"tool\":\"change.open\""));
}

/// Drives the router over a real TCP socket instead of `tower::oneshot`,
/// using `TestConfig` for the base URL and per-call timeout the way a test
/// against a separately launched `changeset-http` would.
#[tokio::test]
async fn real_listener_round_trip_honors_test_config_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.working_directory = dir.path().to_path_buf();
    let state = AppState::new(engine(dir.path().to_path_buf()), config);
    let app = changeset_server::router(state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let mut test_config = TestConfig::new();
    test_config.api_url = format!("http://{addr}");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(test_config.timeout_ms))
        .build()
        .expect("client");
    let mut request = client.post(format!("{}/mcp", test_config.api_url)).json(&serde_json::json!({
        "tool": "changes.active",
        "input": {},
    }));
    if let Some(token) = &test_config.auth_token {
        request = request.bearer_auth(token);
    }

    let resp = request.send().await.expect("request over real socket");
    assert_eq!(resp.status().as_u16(), 200);
    let text = resp.text().await.expect("body");
    assert!(text.contains("\"result\""));
}

#[tokio::test]
async fn healthz_carries_security_headers_by_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.working_directory = dir.path().to_path_buf();
    let state = AppState::new(engine(dir.path().to_path_buf()), config);
    let app = changeset_server::router(state);

    let resp = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(resp.headers().get("X-Content-Type-Options").unwrap(), "nosniff");
}
