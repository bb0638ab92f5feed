//! Server construction config.
//!
//! Every transport (stdio, HTTP) and the workflow engine itself is built from
//! one `AppConfig`, assembled once at startup from environment variables
//! with sane defaults so the stdio transport needs none of the HTTP-only
//! fields set.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub rpm: u32,
    pub burst: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rpm: 120,
            burst: 20,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseLimitsConfig {
    pub max_response_kb: u64,
}

impl Default for ResponseLimitsConfig {
    fn default() -> Self {
        Self {
            max_response_kb: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    pub request_ms: u64,
    pub heartbeat_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_ms: 30_000,
            heartbeat_ms: 25_000,
        }
    }
}

impl TimeoutsConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TlsConfig {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub token_ttl_hours: u64,
    pub signing_key: Option<String>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: 24,
            signing_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub host: String,
    pub auth_tokens: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub response_limits: ResponseLimitsConfig,
    pub timeouts: TimeoutsConfig,
    pub tls: Option<TlsConfig>,
    pub security_headers_enabled: bool,
    pub working_directory: PathBuf,
    pub pagination: PaginationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            host: "127.0.0.1".to_string(),
            auth_tokens: Vec::new(),
            allowed_origins: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            response_limits: ResponseLimitsConfig::default(),
            timeouts: TimeoutsConfig::default(),
            tls: None,
            security_headers_enabled: true,
            working_directory: PathBuf::from("."),
            pagination: PaginationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from environment variables, falling back to defaults for anything unset.
    ///
    /// Mirrors §6's env table: `AUTH_TOKENS`, `PORT`, `HOST`, `TLS_CERT`, `TLS_KEY`,
    /// `ALLOWED_ORIGINS`, `RATE_LIMIT`, `RATE_LIMIT_BURST`, `RATE_LIMIT_WINDOW_MS`,
    /// `MAX_RESPONSE_SIZE_KB`, `REQUEST_TIMEOUT_MS`, `SECURITY_HEADERS_ENABLED`,
    /// plus `CHANGESET_ROOT` for the working directory and `PAGINATION_SIGNING_KEY`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("PORT") {
            if let Ok(p) = v.parse() {
                cfg.port = p;
            }
        }
        if let Ok(v) = std::env::var("HOST") {
            cfg.host = v;
        }
        if let Ok(v) = std::env::var("AUTH_TOKENS") {
            cfg.auth_tokens = split_csv(&v);
        }
        if let Ok(v) = std::env::var("ALLOWED_ORIGINS") {
            cfg.allowed_origins = split_csv(&v);
        }
        if let Ok(v) = std::env::var("RATE_LIMIT") {
            if let Ok(p) = v.parse() {
                cfg.rate_limit.rpm = p;
            }
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_BURST") {
            if let Ok(p) = v.parse() {
                cfg.rate_limit.burst = p;
            }
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_WINDOW_MS") {
            if let Ok(p) = v.parse() {
                cfg.rate_limit.window_ms = p;
            }
        }
        if let Ok(v) = std::env::var("MAX_RESPONSE_SIZE_KB") {
            if let Ok(p) = v.parse() {
                cfg.response_limits.max_response_kb = p;
            }
        }
        if let Ok(v) = std::env::var("REQUEST_TIMEOUT_MS") {
            if let Ok(p) = v.parse() {
                cfg.timeouts.request_ms = p;
            }
        }
        if let Ok(v) = std::env::var("SECURITY_HEADERS_ENABLED") {
            cfg.security_headers_enabled = parse_bool(&v, cfg.security_headers_enabled);
        }
        if let (Ok(cert), Ok(key)) = (std::env::var("TLS_CERT"), std::env::var("TLS_KEY")) {
            cfg.tls = Some(TlsConfig {
                cert_path: Some(PathBuf::from(cert)),
                key_path: Some(PathBuf::from(key)),
            });
        }
        if let Ok(v) = std::env::var("CHANGESET_ROOT") {
            cfg.working_directory = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PAGINATION_SIGNING_KEY") {
            cfg.pagination.signing_key = Some(v);
        }

        cfg
    }
}

fn split_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(v: &str, default: bool) -> bool {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}
