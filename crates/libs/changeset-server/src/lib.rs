//! HTTP transport: `/sse` and `/mcp` both accept
//! `{tool, input, apiVersion?}` and dispatch straight to the tool registry
//! (no JSON-RPC envelope on this transport, unlike stdio); `/healthz`,
//! `/readyz`, and `/` need no auth. State is one `AppState` shared across
//! every connection's task, built once at startup and frozen thereafter
//! except for the rate limiter's counters and the memory monitor's sampler.

pub mod auth;
pub mod error_response;
pub mod ratelimit;
pub mod security;
pub mod timeout;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Router};
use changeset_common::config::AppConfig;
use changeset_core::lifecycle::WorkflowEngine;
use changeset_core::memory::MemoryMonitor;
use futures_util::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error_response::ApiError;
use crate::ratelimit::ClientRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub config: Arc<AppConfig>,
    pub rate_limiter: Arc<ClientRateLimiter>,
    pub memory: Arc<MemoryMonitor>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>, config: AppConfig) -> Self {
        let rate_limiter = Arc::new(ClientRateLimiter::new(&config.rate_limit));
        let memory = MemoryMonitor::new(
            changeset_core::memory::DEFAULT_WARNING_THRESHOLD,
            changeset_core::memory::DEFAULT_CRITICAL_THRESHOLD,
        );
        Self { engine, config: Arc::new(config), rate_limiter, memory, started_at: Instant::now() }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sse", post(sse_handler))
        .route("/mcp", post(mcp_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), ratelimit::rate_limit_middleware));

    let cors = if state.config.allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), timeout::timeout_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), security::security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpToolRequest {
    tool: String,
    #[serde(default)]
    input: Value,
    #[serde(default)]
    api_version: Option<String>,
}

async fn run_tool(engine: Arc<WorkflowEngine>, tool: String, input: Value) -> Result<Value, changeset_core::error::WorkflowError> {
    tokio::task::spawn_blocking(move || changeset_dispatch::tools::call_tool(&engine, &tool, &input))
        .await
        .unwrap_or_else(|e| Err(changeset_core::error::WorkflowError::io(e.to_string())))
}

/// Reject oversize tool results before they're framed onto the wire (spec
/// §4.9's `MAX_RESPONSE_SIZE_KB` cap, `413`/`RESPONSE_TOO_LARGE`).
fn enforce_response_limit(
    state: &AppState,
    value: Value,
) -> Result<Value, changeset_core::error::WorkflowError> {
    let max_bytes = state.config.response_limits.max_response_kb * 1024;
    let size = serde_json::to_vec(&value).map(|b| b.len() as u64).unwrap_or(0);
    if size > max_bytes {
        return Err(changeset_core::error::WorkflowError::new(
            changeset_core::error::ErrorCode::ResponseTooLarge,
            format!("response of {size} bytes exceeds the {max_bytes}-byte cap"),
        ));
    }
    Ok(value)
}

enum SseState {
    Waiting(tokio::sync::oneshot::Receiver<Result<Value, changeset_core::error::WorkflowError>>),
    Done,
}

/// Streams at least one `: keepalive` comment every 25 s while the tool
/// runs on a blocking task, then exactly one terminal `result`/`error`
/// event.
async fn sse_handler(
    State(state): State<AppState>,
    Json(req): Json<HttpToolRequest>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    let started_at = chrono::Utc::now().to_rfc3339();
    let api_version = req.api_version.unwrap_or_else(|| "1.0".to_string());
    let tool = req.tool.clone();
    let engine = Arc::clone(&state.engine);

    let state_for_limit = state.clone();
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let result = run_tool(engine, req.tool, req.input)
            .await
            .and_then(|value| enforce_response_limit(&state_for_limit, value));
        let _ = tx.send(result);
    });

    let stream = stream::unfold(SseState::Waiting(rx), move |state| {
        let api_version = api_version.clone();
        let tool = tool.clone();
        let started_at = started_at.clone();
        async move {
            let SseState::Waiting(mut rx) = state else { return None };
            tokio::select! {
                result = &mut rx => {
                    let event = match result {
                        Ok(Ok(value)) => Event::default().event("result").json_data(json!({
                            "apiVersion": api_version,
                            "tool": tool,
                            "startedAt": started_at,
                            "result": value,
                            "duration": 0,
                        })),
                        Ok(Err(err)) => Event::default().event("error").json_data(ApiError::from_workflow_error(&err)),
                        Err(_) => Event::default().event("error").json_data(
                            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "EIO", "tool task aborted"),
                        ),
                    };
                    let event = event.unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
                    Some((Ok(event), SseState::Done))
                }
                _ = tokio::time::sleep(Duration::from_secs(25)) => {
                    Some((Ok(Event::default().comment("keepalive")), SseState::Waiting(rx)))
                }
            }
        }
    });

    Sse::new(Box::pin(stream) as BoxStream<'static, Result<Event, Infallible>>).keep_alive(default_keep_alive())
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum NdjsonLine {
    #[serde(rename = "start")]
    Start { ts: String, tool: String, #[serde(rename = "apiVersion")] api_version: String },
    #[serde(rename = "result")]
    Result { ts: String, result: Value },
    #[serde(rename = "error")]
    Error { ts: String, error: ApiError },
    #[serde(rename = "end")]
    End { ts: String },
}

async fn mcp_handler(State(state): State<AppState>, Json(req): Json<HttpToolRequest>) -> impl IntoResponse {
    let api_version = req.api_version.unwrap_or_else(|| "1.0".to_string());
    let tool = req.tool.clone();
    let engine = Arc::clone(&state.engine);

    let mut lines = Vec::with_capacity(3);
    lines.push(NdjsonLine::Start { ts: chrono::Utc::now().to_rfc3339(), tool: tool.clone(), api_version });

    let outcome = run_tool(engine, req.tool, req.input)
        .await
        .and_then(|value| enforce_response_limit(&state, value));
    match outcome {
        Ok(result) => lines.push(NdjsonLine::Result { ts: chrono::Utc::now().to_rfc3339(), result }),
        Err(err) => lines.push(NdjsonLine::Error { ts: chrono::Utc::now().to_rfc3339(), error: ApiError::from_workflow_error(&err) }),
    }
    lines.push(NdjsonLine::End { ts: chrono::Utc::now().to_rfc3339() });

    let body = lines
        .into_iter()
        .map(|l| serde_json::to_string(&l).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";

    (
        [(axum::http::header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new().interval(Duration::from_secs(25)).text(": keepalive")
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    #[serde(rename = "uptimeSecs")]
    uptime_secs: u64,
}

async fn healthz_handler(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody { status: "ok", uptime_secs: state.started_at.elapsed().as_secs() })
}

async fn readyz_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if !state.engine.root.exists() {
        return Err(ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "NOT_READY", "workflow root is not accessible"));
    }
    Ok(Json(json!({ "status": "ready", "tools": changeset_dispatch::tools::TOOL_NAMES })))
}

async fn index_handler() -> Json<Value> {
    Json(json!({
        "name": "changeset-workflow",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/sse", "/mcp", "/healthz", "/readyz", "/"],
    }))
}
