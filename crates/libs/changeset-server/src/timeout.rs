//! Per-request timeout (spec §4.9, §6's `REQUEST_TIMEOUT_MS`). Wraps the
//! rest of the middleware stack and the handler in a deadline; a request
//! that doesn't finish in time yields `408` / `REQUEST_TIMEOUT` instead of
//! hanging the connection. Streaming reads are not cut off by this layer —
//! the streaming reader's own backpressure handling governs long-running
//! `/sse` responses (spec §5's "does not fail outright; it applies
//! backpressure and continues").

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error_response::ApiError;

pub async fn timeout_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match tokio::time::timeout(state.config.timeouts.request(), next.run(req)).await {
        Ok(response) => Ok(response),
        Err(_) => Err(ApiError::new(
            StatusCode::REQUEST_TIMEOUT,
            "REQUEST_TIMEOUT",
            "request exceeded the configured timeout",
        )),
    }
}
