//! Server-level error wrapper.
//!
//! This crate's `ServerError` wraps startup/config/IO failures that never
//! reach a client as a JSON-RPC or HTTP error envelope — those are owned by
//! `changeset-core::error::Error` and `changeset-dispatch`. `ServerError`
//! exists for process-level failures: bad config, unbindable ports, and the
//! like, which the transports surface as nonzero exit codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workflow engine error: {0}")]
    Core(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
