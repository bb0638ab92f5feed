//! Per-client rate limiting: sliding window over 60 s with a burst cap,
//! keyed by bearer token (falling back to the connecting IP for
//! unauthenticated requests). Built on `governor`'s keyed limiter, narrowed
//! down to the single window/burst/rpm shape configured via `RATE_LIMIT`,
//! `RATE_LIMIT_BURST`, `RATE_LIMIT_WINDOW_MS`.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};

use crate::AppState;
use crate::error_response::ApiError;
use changeset_common::config::RateLimitConfig as RateLimitSettings;

type KeyedRateLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

#[derive(Clone)]
pub struct ClientRateLimiter {
    limiter: Arc<KeyedRateLimiter>,
    retry_after_secs: u64,
}

impl ClientRateLimiter {
    /// `rpm` here doubles as "requests per window"; the window defaults
    /// to 60 s, so the configured window length scales the quota's replenish
    /// period instead of assuming a fixed minute.
    pub fn new(settings: &RateLimitSettings) -> Self {
        let period = std::time::Duration::from_millis(settings.window_ms.max(1));
        let rpm = NonZeroU32::new(settings.rpm.max(1)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(settings.burst.max(1)).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period / rpm.get()).unwrap_or(Quota::per_second(NonZeroU32::MIN)).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            retry_after_secs: (settings.window_ms / 1000).max(1),
        }
    }

    fn check(&self, key: &str) -> Result<(), ApiError> {
        self.limiter.check_key(&key.to_string()).map_err(|_| {
            ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED", "rate limit exceeded")
                .with_retry_after(self.retry_after_secs)
        })
    }
}

fn client_key(req: &Request, remote: Option<SocketAddr>) -> String {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .unwrap_or_else(|| remote.map(|a| a.ip().to_string()).unwrap_or_else(|| "unknown".to_string()))
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(&req, Some(remote));
    state.rate_limiter.check(&key)?;
    Ok(next.run(req).await)
}
