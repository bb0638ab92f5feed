//! Test configuration

/// Configuration for end-to-end tests.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Base URL for a running `changeset-http` instance, when a test drives one.
    pub api_url: String,
    /// Bearer token to send alongside `api_url`, if any.
    pub auth_token: Option<String>,
    /// Timeout for a single tool call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("TEST_API_URL").unwrap_or_else(|_| "http://localhost:8765".to_string()),
            auth_token: std::env::var("TEST_AUTH_TOKEN").ok(),
            timeout_ms: std::env::var("TEST_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(5000),
        }
    }
}

impl TestConfig {
    pub fn new() -> Self {
        Self::default()
    }
}
