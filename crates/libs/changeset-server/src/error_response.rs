//! The HTTP error envelope: `{ apiVersion, error: {code, message,
//! hint?, details?, retryAfter?}, timestamp, requestId? }`. Every rejected
//! request — auth, rate limit, validation, or a workflow engine failure —
//! renders through this one type so the shape never drifts per call site.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use changeset_core::error::WorkflowError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    #[serde(rename = "apiVersion")]
    api_version: String,
    error: ErrorBody,
    timestamp: String,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(skip)]
    status: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            api_version: "1.0".to_string(),
            error: ErrorBody { code: code.into(), message: message.into(), hint: None, details: None, retry_after: None },
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: None,
            status: status.as_u16(),
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.error.retry_after = Some(secs);
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn from_workflow_error(err: &WorkflowError) -> Self {
        let status = StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut api_err = Self::new(status, err.code.as_str(), err.message.clone());
        api_err.error.hint = err.hint.clone();
        api_err.error.details = err.details.clone();
        api_err
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = self.error.retry_after;
        let mut response = (status, Json(self)).into_response();
        // Rate-limit responses carry the retry hint as a header too (spec
        // §4.9), not just in the JSON body, so clients that only look at
        // headers still back off correctly.
        if let Some(secs) = retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert("X-RateLimit-Retry-After", value);
            }
        }
        response
    }
}
