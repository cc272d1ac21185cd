//! Client builder for configuring retries, reconnection, and telemetry
//!
//! The `ClientBuilder` provides a fluent API for configuring a
//! [`JobClient`] before use. It allows you to:
//! - Set credentials and the request deadline
//! - Replace the retry and reconnect strategies
//! - Configure observability (OpenTelemetry)
//! - Set service name for telemetry
//!
//! # Examples
//!
//! ```rust,no_run
//! use jobwire_client::{ClientBuilder, ExponentialBackoff};
//! use std::time::Duration;
//!
//! # fn example() -> jobwire_core::Result<()> {
//! // Faster reconnects
//! let client = ClientBuilder::new("http://localhost:8888")
//!     .api_key("secret")
//!     .reconnect(ExponentialBackoff::new(Duration::from_millis(250)).with_max_attempts(5))
//!     .build()?;
//!
//! // With observability
//! let client2 = ClientBuilder::new("http://localhost:8888")
//!     .with_default_observability()
//!     .service_name("dashboard")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::backoff::{BackoffStrategy, NoBackoff};
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::executor::RequestExecutor;
use crate::{ClientMetrics, JobClient};
use jobwire_core::{ClientError, ObservabilityConfig, Result};
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring and creating a JobClient
pub struct ClientBuilder {
    config: ClientConfig,
    retry_strategy: Option<Arc<dyn BackoffStrategy>>,
    reconnect_strategy: Option<Arc<dyn BackoffStrategy>>,
    http_client: Option<reqwest::Client>,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(base_url))
    }

    /// Start from an existing configuration
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            retry_strategy: None,
            reconnect_strategy: None,
            http_client: None,
            observability_config: None,
            service_name: None,
        }
    }

    /// Start from `JOBWIRE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_config(ClientConfig::from_env())
    }

    /// Bearer token for request/response calls
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    /// Token for event streams, if it differs from the API key
    pub fn stream_token(mut self, token: impl Into<String>) -> Self {
        self.config.stream_token = Some(token.into());
        self
    }

    /// Deadline of every request/response call
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Retry strategy for idempotent reads
    pub fn retry(mut self, strategy: impl BackoffStrategy + 'static) -> Self {
        self.retry_strategy = Some(Arc::new(strategy));
        self
    }

    /// Run every read exactly once
    pub fn without_retry(self) -> Self {
        self.retry(NoBackoff)
    }

    /// Reconnect strategy for event streams
    pub fn reconnect(mut self, strategy: impl BackoffStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Arc::new(strategy));
        self
    }

    /// Never reconnect after a transient close
    pub fn without_reconnect(self) -> Self {
        self.reconnect(NoBackoff)
    }

    /// Use a preconfigured reqwest client (proxies, TLS roots, pools)
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the client
    ///
    /// No connection is made here; streams open on
    /// [`JobClient::connect`].
    pub fn build(self) -> Result<JobClient> {
        // Initialize observability if configured
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            jobwire_core::init_observability(config.clone()).map_err(|e| {
                ClientError::unknown(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(ClientMetrics::new(config.service_name)))
        } else {
            None
        };

        let config = self.config;
        let mut executor = match self.http_client {
            Some(http) => RequestExecutor::with_http_client(http, &config.base_url, &config.api_key),
            None => RequestExecutor::new(&config.base_url, &config.api_key)?,
        };
        executor.set_metrics(metrics.clone());

        let reconnect = self
            .reconnect_strategy
            .unwrap_or_else(|| Arc::new(config.reconnect.clone()));
        let mut connections =
            ConnectionManager::new(&config.base_url, config.effective_stream_token(), reconnect)?;
        connections.set_metrics(metrics.clone());

        tracing::debug!(base_url = %config.base_url, "Job client ready");

        Ok(JobClient {
            executor,
            connections,
            retry: self
                .retry_strategy
                .unwrap_or_else(|| Arc::new(config.retry.clone())),
            request_timeout: config.request_timeout,
            metrics,
        })
    }
}
