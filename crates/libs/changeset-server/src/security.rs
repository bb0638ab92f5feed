//! Security response headers, toggled by `SECURITY_HEADERS_ENABLED` (spec
//! §6). Applied to every response, including the unauthenticated health
//! probes — these headers harden the client's handling of the response,
//! not the server's own authorization decision.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;

pub async fn security_headers_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    if state.config.security_headers_enabled {
        let headers = response.headers_mut();
        headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
        headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
        headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
        headers.insert(
            "Cache-Control",
            response
                .headers()
                .get("cache-control")
                .cloned()
                .unwrap_or_else(|| HeaderValue::from_static("no-store")),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use changeset_core::memory::MemoryMonitor;
    use crate::ratelimit::ClientRateLimiter;
    use axum::body::Body;
    use axum::http::StatusCode;
    use changeset_common::config::AppConfig;
    use changeset_core::git_collab::NullCommitLookup;
    use changeset_core::lifecycle::WorkflowEngine;
    use changeset_core::pagination::Pagination;
    use changeset_core::template::DefaultTemplateRenderer;
    use changeset_core::test_collab::NoTestSummary;
    use std::sync::Arc;
    use std::time::Instant;
    use tower::ServiceExt;

    fn state(security_headers_enabled: bool) -> AppState {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.security_headers_enabled = security_headers_enabled;
        let engine = Arc::new(WorkflowEngine {
            root: dir.into_path(),
            api_version: "1.0".to_string(),
            template_renderer: Arc::new(DefaultTemplateRenderer::default()),
            commit_lookup: Arc::new(NullCommitLookup),
            test_summary: Arc::new(NoTestSummary),
            pagination: Pagination::default(),
        });
        AppState {
            rate_limiter: Arc::new(ClientRateLimiter::new(&config.rate_limit)),
            memory: MemoryMonitor::new(8, 32),
            engine,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn adds_headers_when_enabled() {
        let app = crate::router(state(true));
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("X-Content-Type-Options").unwrap(), "nosniff");
    }

    #[tokio::test]
    async fn omits_headers_when_disabled() {
        let app = crate::router(state(false));
        let resp = app
            .oneshot(axum::http::Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.headers().get("X-Content-Type-Options").is_none());
    }
}
