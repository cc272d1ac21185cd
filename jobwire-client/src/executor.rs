//! Single-attempt request/response executor
//!
//! # Request Lifecycle
//!
//! 1. **Build**: join base URL and path, add bearer token, JSON content
//!    type, and per-call header overrides
//! 2. **Send and read**: the whole exchange runs under the request deadline
//! 3. **Timeout**: on expiry the in-flight future is dropped, which aborts
//!    the HTTP call, and a `Timeout` error is returned
//! 4. **Non-success**: the body is parsed as JSON to surface the server's
//!    message, then classified by status
//! 5. **Success**: the body is decoded into the caller's type; a decode
//!    failure is `Unknown`
//!
//! There is no retry here. Retries are layered on top with
//! [`with_retry`](crate::with_retry).

use crate::metrics::ClientMetrics;
use jobwire_core::{classify, ClientError, RawFailure, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deadline applied to every request/response call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Description of one request/response call
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub path: String,
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            body: None,
            headers: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override or add a header for this call
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Executes [`RequestSpec`]s against the job service
#[derive(Clone)]
pub struct RequestExecutor {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    metrics: Option<Arc<ClientMetrics>>,
}

impl RequestExecutor {
    /// Create an executor
    ///
    /// The reqwest client carries no timeout of its own; deadlines are
    /// enforced per call from [`RequestSpec::timeout`].
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build().map_err(|e| {
            ClientError::unknown(format!("Failed to build HTTP client: {}", e)).with_source(e)
        })?;
        Ok(Self::with_http_client(http, base_url, api_key))
    }

    /// Create an executor around an existing reqwest client
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            metrics: None,
        }
    }

    pub(crate) fn set_metrics(&mut self, metrics: Option<Arc<ClientMetrics>>) {
        self.metrics = metrics;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Run one request and decode the success body as `T`
    #[tracing::instrument(skip(self, spec), fields(method = %spec.method, path = %spec.path))]
    pub async fn execute<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T> {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(spec.timeout, self.send(spec)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RawFailure::TimedOut {
                after_ms: spec.timeout.as_millis() as u64,
            }),
        };

        // An empty success body (typical for DELETE) decodes as JSON null
        let result = outcome.and_then(|body| {
            let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
                b"null"
            } else {
                &body
            };
            serde_json::from_slice::<T>(body).map_err(|e| RawFailure::Decode {
                message: e.to_string(),
                source: Some(Arc::new(e)),
            })
        });

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(value) => {
                tracing::debug!(duration_secs = elapsed, "Request completed");
                if let Some(ref m) = self.metrics {
                    m.record_request(spec.method.as_str(), "success", elapsed);
                }
                Ok(value)
            }
            Err(failure) => {
                let error = classify(failure);
                tracing::warn!(
                    kind = %error.kind(),
                    status = ?error.status(),
                    error = %error.message(),
                    "Request failed"
                );
                if let Some(ref m) = self.metrics {
                    m.record_request(spec.method.as_str(), "error", elapsed);
                    m.record_error(error.kind().as_str());
                }
                Err(error)
            }
        }
    }

    /// Send the request and read the full body
    ///
    /// Returns the raw success body, or the raw failure for the classifier.
    async fn send(&self, spec: &RequestSpec) -> std::result::Result<Vec<u8>, RawFailure> {
        let url = format!("{}{}", self.base_url, spec.path);
        let mut request = self
            .http
            .request(spec.method.clone(), &url)
            .headers(self.headers(spec)?);

        if let Some(ref body) = spec.body {
            request = request.json(body);
        }

        tracing::debug!(url = %url, "Sending request");
        let response = request.send().await.map_err(lower_reqwest_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(lower_reqwest_error)?;

        if status.is_success() {
            return Ok(body.to_vec());
        }

        Err(RawFailure::Status {
            status: status.as_u16(),
            body: serde_json::from_slice(&body).ok(),
        })
    }

    fn headers(&self, spec: &RequestSpec) -> std::result::Result<HeaderMap, RawFailure> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !self.api_key.is_empty() {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", self.api_key))?);
        }

        for (name, value) in &spec.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid_header(name, e))?;
            headers.insert(name, header_value(value)?);
        }

        Ok(headers)
    }
}

fn header_value(value: &str) -> std::result::Result<HeaderValue, RawFailure> {
    HeaderValue::from_str(value).map_err(|e| invalid_header(value, e))
}

fn invalid_header(what: &str, e: impl std::error::Error + Send + Sync + 'static) -> RawFailure {
    RawFailure::Transport {
        message: format!("Invalid header '{}': {}", what, e),
        connection: false,
        source: Some(Arc::new(e)),
    }
}

/// Lower a reqwest error into the classifier's input
fn lower_reqwest_error(e: reqwest::Error) -> RawFailure {
    if e.is_timeout() {
        return RawFailure::TimedOut { after_ms: 0 };
    }
    let connection = e.is_connect() || e.is_request() || e.is_body();
    let message = if connection {
        format!("Network error: {}", e)
    } else {
        e.to_string()
    };
    RawFailure::Transport {
        message,
        connection,
        source: Some(Arc::new(e)),
    }
}
