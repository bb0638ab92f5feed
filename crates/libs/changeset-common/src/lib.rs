//! Ambient stack shared by every crate in the workspace: configuration,
//! the process-level error type, and tracing setup.

pub mod config;
pub mod error;
pub mod tracing;

pub use config::AppConfig;
pub use error::{Result, ServerError};
