//! Job-service client facade
//!
//! [`JobClient`] exposes the service's domain operations on top of the
//! [`RequestExecutor`] and the event streams on top of the
//! [`ConnectionManager`].
//!
//! # Retries
//!
//! Idempotent reads (`get_job`, `list_jobs`, `list_sources`) go through
//! [`with_retry`]. Writes and metadata lookups run once.
//!
//! # Envelopes
//!
//! Every operation accepts both the bare and the wrapped response shape
//! (see [`Envelope`]) and normalizes them to the same output.
//!
//! # Cloning
//!
//! `JobClient` is cheaply cloneable. Clones share the HTTP connection pool
//! and the stream connections.

use crate::backoff::BackoffStrategy;
use crate::connection::{ConnectOutcome, ConnectionManager, EventSink};
use crate::connection_state::ConnectionState;
use crate::executor::{RequestExecutor, RequestSpec};
use crate::metrics::ClientMetrics;
use crate::retry::with_retry;
use crate::ClientBuilder;
use jobwire_core::{
    validate_job_id, ClientError, ConnectionScope, Envelope, Result, StreamEvent,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Parameters of a new job
///
/// `service` and `title_id` are required; everything else is passed to the
/// service untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub service: String,
    pub title_id: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl StartJobRequest {
    pub fn new(service: impl Into<String>, title_id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            title_id: title_id.into(),
            options: Map::new(),
        }
    }

    /// Add a service-specific option
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Client for the job-processing service
#[derive(Clone)]
pub struct JobClient {
    pub(crate) executor: RequestExecutor,
    pub(crate) connections: ConnectionManager,
    pub(crate) retry: Arc<dyn BackoffStrategy>,
    pub(crate) request_timeout: Duration,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

impl JobClient {
    /// Create a client with default settings
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        ClientBuilder::new(base_url).api_key(api_key).build()
    }

    /// Create a client from `JOBWIRE_*` environment variables
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_env().build()
    }

    /// Start configuring a client
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        self.executor.base_url()
    }

    pub fn api_key(&self) -> &str {
        self.executor.api_key()
    }

    /// Stream connections of this client
    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Start a job and return its id
    #[tracing::instrument(skip(self, request), fields(service = %request.service, title_id = %request.title_id))]
    pub async fn start_job(&self, request: &StartJobRequest) -> Result<String> {
        require("service", &request.service)?;
        require("title_id", &request.title_id)?;

        let body = serde_json::to_value(request).map_err(|e| {
            ClientError::validation(format!("Invalid job request: {}", e)).with_source(e)
        })?;
        let envelope = self
            .fetch(&self.request(RequestSpec::post("/api/download").with_body(body)))
            .await
            .and_then(Envelope::parse)?;
        envelope.check("Download failed to start")?;

        let job_id = envelope
            .field("job_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::unknown("No job id received"))?;

        tracing::info!(job_id, "Job started");
        Ok(job_id.to_string())
    }

    /// Fetch one job record
    #[tracing::instrument(skip(self))]
    pub async fn get_job(&self, job_id: &str) -> Result<Value> {
        validate_job_id(job_id)?;

        let spec = self.request(RequestSpec::get(job_path(job_id)));
        let envelope = self
            .retrying("get_job", || self.fetch(&spec))
            .await
            .and_then(Envelope::parse)?;
        envelope.check("Failed to get job status")?;

        envelope
            .into_data()
            .filter(|data| !data.is_null())
            .ok_or_else(|| ClientError::unknown("No job data received"))
    }

    /// List all jobs known to the service
    ///
    /// With `include_full_details` the service adds per-job error details.
    #[tracing::instrument(skip(self))]
    pub async fn list_jobs(&self, include_full_details: bool) -> Result<Vec<Value>> {
        let path = if include_full_details {
            "/api/download/jobs?include_full_details=true"
        } else {
            "/api/download/jobs"
        };

        let spec = self.request(RequestSpec::get(path));
        self.retrying("list_jobs", || self.fetch(&spec))
            .await
            .and_then(Envelope::parse)?
            .into_list("jobs", "Failed to get jobs")
    }

    /// Cancel a job
    ///
    /// Open event streams of the job are not touched; the service closes
    /// them on its own.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
        validate_job_id(job_id)?;

        let value = self
            .fetch(&self.request(RequestSpec::delete(job_path(job_id))))
            .await?;
        if !value.is_null() {
            Envelope::parse(value)?.check("Failed to cancel job")?;
        }

        tracing::info!("Job cancelled");
        Ok(())
    }

    /// List the upstream sources the service can fetch from
    #[tracing::instrument(skip(self))]
    pub async fn list_sources(&self) -> Result<Vec<Value>> {
        let spec = self.request(RequestSpec::get("/api/services"));
        self.retrying("list_sources", || self.fetch(&spec))
            .await
            .and_then(Envelope::parse)?
            .into_list("services", "Failed to get services")
    }

    /// Look up title metadata; `None` when the source knows no such title
    #[tracing::instrument(skip(self))]
    pub async fn title_metadata(&self, source: &str, title_id: &str) -> Result<Option<Value>> {
        let envelope = self
            .lookup("/api/list-titles", source, title_id)
            .await?;

        if let Some(titles) = envelope.field("titles").and_then(Value::as_array) {
            return Ok(titles.first().cloned());
        }
        envelope.check("Failed to get title info")?;
        Ok(None)
    }

    /// Look up track metadata; `None` when the service returned none
    #[tracing::instrument(skip(self))]
    pub async fn track_metadata(&self, source: &str, title_id: &str) -> Result<Option<Value>> {
        let envelope = self
            .lookup("/api/list-tracks", source, title_id)
            .await?;

        if envelope.has_bare("title") {
            return Ok(Some(envelope.into_value()));
        }
        if envelope.has_wrapped("title") {
            return Ok(envelope.into_data());
        }
        envelope.check("Failed to get track info")?;
        Ok(None)
    }

    /// Open the stream of `scope`
    pub async fn connect(&self, scope: ConnectionScope, sink: EventSink) -> ConnectOutcome {
        self.connections.connect(scope, sink).await
    }

    /// Open the service-wide event stream
    pub async fn connect_global_events(&self, sink: EventSink) -> ConnectOutcome {
        self.connect(ConnectionScope::Global, sink).await
    }

    /// Open the event stream of one job
    pub async fn connect_job_events(&self, job_id: &str, sink: EventSink) -> Result<ConnectOutcome> {
        validate_job_id(job_id)?;
        Ok(self.connect(ConnectionScope::job(job_id), sink).await)
    }

    /// Open the stream of `scope` and return its events
    ///
    /// If the scope is already connecting or reconnecting for another
    /// listener, the returned receiver is closed at once and `recv()`
    /// yields `None`; that listener keeps the stream. An invalid job scope
    /// yields a single `Error` event. Use [`JobClient::connect`] to see
    /// which case applied.
    pub async fn subscribe(&self, scope: ConnectionScope) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connect(scope, tx).await;
        rx
    }

    /// Close the stream of `scope` without reconnecting
    pub async fn disconnect(&self, scope: &ConnectionScope) {
        self.connections.disconnect(scope).await;
    }

    /// Close every stream of this client
    pub async fn disconnect_all(&self) {
        self.connections.disconnect_all().await;
    }

    /// State of the stream of `scope`
    pub async fn connection_state(&self, scope: &ConnectionScope) -> ConnectionState {
        self.connections.state(scope).await
    }

    fn request(&self, spec: RequestSpec) -> RequestSpec {
        spec.with_timeout(self.request_timeout)
    }

    async fn fetch(&self, spec: &RequestSpec) -> Result<Value> {
        self.executor.execute(spec).await
    }

    async fn lookup(&self, path: &str, source: &str, title_id: &str) -> Result<Envelope> {
        require("source", source)?;
        require("title_id", title_id)?;

        let body = json!({ "service": source, "title_id": title_id });
        self.fetch(&self.request(RequestSpec::post(path).with_body(body)))
            .await
            .and_then(Envelope::parse)
    }

    /// Run an idempotent read through the retry wrapper
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        with_retry(self.retry.as_ref(), || {
            if attempts.fetch_add(1, Ordering::Relaxed) > 0 {
                if let Some(ref m) = self.metrics {
                    m.record_retry(operation);
                }
            }
            f()
        })
        .await
    }
}

fn job_path(job_id: &str) -> String {
    format!("/api/download/jobs/{}", job_id)
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ClientError::validation(format!("{} is required", field)));
    }
    Ok(())
}
