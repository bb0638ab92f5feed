//! Bearer-token auth: every non-health endpoint requires a token matching
//! one of `AppConfig.auth_tokens`. There is no JWT/JWKS here — token
//! issuance is an external collaborator's job, so this middleware only
//! compares against the configured accepted-token list, the simplest thing
//! that satisfies the `AUTHENTICATION_FAILED` requirement.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error_response::ApiError;

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub async fn auth_middleware(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    if state.config.auth_tokens.is_empty() {
        tracing::warn!("no AUTH_TOKENS configured; accepting request unauthenticated");
        return Ok(next.run(req).await);
    }

    let token = bearer_token(&req).ok_or_else(|| {
        ApiError::new(StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED", "missing bearer token")
    })?;

    if !state.config.auth_tokens.iter().any(|t| t == token) {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED", "bearer token not recognized"));
    }

    Ok(next.run(req).await)
}
