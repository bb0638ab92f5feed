//! The error taxonomy (spec §7). Every failure the workflow engine can
//! produce carries a stable wire `code` — the taxonomy is the single
//! source of truth the JSON-RPC dispatcher and HTTP transport both project
//! their own envelopes from, so the mapping lives here rather than being
//! duplicated per transport.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    EBadSlug,
    EPathEscape,
    ENoChange,
    EArchived,
    ELocked,
    EBadShapeMissingProposal,
    EBadShapeMissingTasks,
    EIo,
    InvalidToolName,
    ToolNotFound,
    MethodNotFound,
    InvalidInput,
    AuthenticationFailed,
    RateLimitExceeded,
    ResponseTooLarge,
    RequestTimeout,
    InvalidCursorToken,
    ExpiredCursorToken,
    InvalidFormat,
    InvalidScheme,
}

impl ErrorCode {
    /// Stable wire identifier, e.g. `"EBADSLUG"`. Never renamed across releases.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EBadSlug => "EBADSLUG",
            Self::EPathEscape => "EPATH_ESCAPE",
            Self::ENoChange => "ENOCHANGE",
            Self::EArchived => "EARCHIVED",
            Self::ELocked => "ELOCKED",
            Self::EBadShapeMissingProposal => "EBADSHAPE_MISSING_PROPOSAL",
            Self::EBadShapeMissingTasks => "EBADSHAPE_MISSING_TASKS",
            Self::EIo => "EIO",
            Self::InvalidToolName => "INVALID_TOOL_NAME",
            Self::ToolNotFound => "TOOL_NOT_FOUND",
            Self::MethodNotFound => "METHOD_NOT_FOUND",
            Self::InvalidInput => "INVALID_INPUT",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ResponseTooLarge => "RESPONSE_TOO_LARGE",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::InvalidCursorToken => "INVALID_CURSOR_TOKEN",
            Self::ExpiredCursorToken => "EXPIRED_CURSOR_TOKEN",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::InvalidScheme => "INVALID_SCHEME",
        }
    }

    /// JSON-RPC 2.0 error code for this taxonomy entry (§7's dispatcher mapping column).
    ///
    /// `INVALID_TOOL_NAME`, `TOOL_NOT_FOUND`, and `INVALID_INPUT` share one row
    /// in the spec's error table (−32602, "invalid params") — an unrecognized
    /// tool name inside an otherwise well-formed `tools/call` is a bad
    /// argument to that call, distinct from `MethodNotFound`, which is the
    /// JSON-RPC protocol's own "no such top-level method" case.
    pub fn jsonrpc_code(self) -> i64 {
        match self {
            Self::EBadSlug
            | Self::EPathEscape
            | Self::InvalidToolName
            | Self::ToolNotFound
            | Self::InvalidInput
            | Self::InvalidCursorToken
            | Self::ExpiredCursorToken
            | Self::InvalidFormat
            | Self::InvalidScheme => -32602,
            Self::EIo => -32603,
            Self::MethodNotFound => -32601,
            // Tool-result errors (ENOCHANGE, EARCHIVED, ELOCKED, shape errors) and
            // HTTP-only errors are not raw JSON-RPC protocol errors; callers that need
            // a code for them still get one, framed as an application error (-32000).
            _ => -32000,
        }
    }

    /// HTTP status this error maps to on the `/sse` and `/mcp` transports.
    pub fn http_status(self) -> u16 {
        match self {
            Self::EBadSlug | Self::EPathEscape | Self::InvalidInput | Self::InvalidCursorToken => {
                400
            }
            Self::ENoChange => 404,
            Self::EArchived | Self::ELocked => 409,
            Self::EBadShapeMissingProposal | Self::EBadShapeMissingTasks => 422,
            Self::EIo => 500,
            Self::InvalidToolName => 400,
            Self::ToolNotFound => 404,
            Self::MethodNotFound => 404,
            Self::AuthenticationFailed => 401,
            Self::RateLimitExceeded => 429,
            Self::ResponseTooLarge => 413,
            Self::RequestTimeout => 408,
            Self::ExpiredCursorToken => 400,
            Self::InvalidFormat | Self::InvalidScheme => 400,
        }
    }
}

#[derive(Debug, Error)]
#[error("{code_str}: {message}")]
pub struct WorkflowError {
    pub code: ErrorCode,
    pub message: String,
    pub hint: Option<String>,
    pub details: Option<serde_json::Value>,
    code_str: &'static str,
}

impl WorkflowError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
            details: None,
            code_str: code.as_str(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_slug(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::EBadSlug, reason)
    }

    pub fn path_escape(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::EPathEscape, reason)
    }

    pub fn no_change(slug: &str) -> Self {
        Self::new(ErrorCode::ENoChange, format!("no such change: {slug}"))
    }

    pub fn archived(slug: &str) -> Self {
        Self::new(ErrorCode::EArchived, format!("change already archived: {slug}"))
    }

    pub fn locked(slug: &str, owner: &str, expires_in_secs: i64) -> Self {
        Self::new(
            ErrorCode::ELocked,
            format!("change '{slug}' is locked by '{owner}'"),
        )
        .with_details(serde_json::json!({ "owner": owner, "expiresInSecs": expires_in_secs }))
    }

    pub fn io(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::EIo, err.to_string())
    }
}

impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        WorkflowError::io(err)
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
