use crate::backoff::ExponentialBackoff;
use crate::executor::DEFAULT_REQUEST_TIMEOUT;
use std::{env, time::Duration};

/// Base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8888";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service base URL (default: "http://localhost:8888")
    pub base_url: String,
    /// Bearer token for request/response calls (default: empty, no header)
    pub api_key: String,
    /// Token for event streams (default: the API key)
    pub stream_token: Option<String>,
    /// Per-call deadline (default: 30 s)
    pub request_timeout: Duration,
    /// Retry policy for idempotent reads (default: 3 retries from 1 s)
    pub retry: ExponentialBackoff,
    /// Reconnect policy for streams (default: 5 reconnects from 1 s)
    pub reconnect: ExponentialBackoff,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: String::new(),
            stream_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: ExponentialBackoff::request_default(),
            reconnect: ExponentialBackoff::reconnect_default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `JOBWIRE_URL` - Service base URL (default: "http://localhost:8888")
    /// - `JOBWIRE_API_KEY` - Bearer token (default: empty)
    /// - `JOBWIRE_STREAM_TOKEN` - Stream token (default: the API key)
    pub fn from_env() -> Self {
        let mut config =
            Self::new(env::var("JOBWIRE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()));
        config.api_key = env::var("JOBWIRE_API_KEY").unwrap_or_default();
        config.stream_token = env::var("JOBWIRE_STREAM_TOKEN").ok();
        config
    }

    /// Token sent on stream URLs
    pub fn effective_stream_token(&self) -> &str {
        self.stream_token.as_deref().unwrap_or(&self.api_key)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
