//! OpenTelemetry observability configuration and initialization
//!
//! Sets up traces, metrics, and structured logs for an application that
//! embeds the jobwire client. Telemetry is exported over OTLP/gRPC; local
//! logs are written as JSON through `tracing-subscriber`.
//!
//! Initialize once at startup, before building a client:
//!
//! ```rust,no_run
//! use jobwire_core::ObservabilityConfig;
//!
//! fn main() {
//!     let config = ObservabilityConfig::new("dashboard")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("debug");
//!
//!     jobwire_core::init_observability(config).expect("Failed to init observability");
//!
//!     // ... run the application ...
//!
//!     jobwire_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector endpoint
//! - `RUST_LOG`: log filter (takes precedence over `log_level`)

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Interval between metric exports
const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Observability configuration for OpenTelemetry
///
/// # Defaults
///
/// - Service name: "jobwire"
/// - Service version: the crate version
/// - OTLP endpoint: `$OTEL_EXPORTER_OTLP_ENDPOINT` or "http://localhost:4317"
/// - Traces, metrics, and logs enabled
/// - Log level: `$RUST_LOG` or "info"
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to all telemetry
    pub service_name: String,

    /// Service version attached to all telemetry
    pub service_version: String,

    /// gRPC endpoint of the OpenTelemetry collector
    pub otlp_endpoint: String,

    /// Export spans
    pub enable_traces: bool,

    /// Export metrics
    pub enable_metrics: bool,

    /// Emit structured logs
    ///
    /// When disabled no subscriber is installed, so the embedding
    /// application keeps control of its own logging setup.
    pub enable_logs: bool,

    /// Log filter directive ("error", "warn", "info", "debug", "trace",
    /// or per-target directives such as "jobwire_client=debug")
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "jobwire".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    /// Create a configuration with a custom service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the OTLP collector endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    /// Set the log filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    fn resource(&self) -> opentelemetry_sdk::Resource {
        opentelemetry_sdk::Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Initialize OpenTelemetry with the given configuration
///
/// Call once per process. Global providers and the tracing subscriber can
/// only be installed a single time.
///
/// # Errors
///
/// Fails when an exporter cannot be built (invalid endpoint) or the log
/// filter does not parse.
pub fn init_observability(
    config: ObservabilityConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // The tracer must exist before the subscriber, which wraps it in a layer
    let tracer = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    if config.enable_metrics {
        init_metrics(&config)?;
    }

    if config.enable_logs {
        init_tracing_subscriber(&config, tracer)?;
    }

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "OpenTelemetry initialized"
    );

    Ok(())
}

fn init_tracer(
    config: &ObservabilityConfig,
) -> Result<opentelemetry_sdk::trace::Tracer, Box<dyn std::error::Error + Send + Sync>> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider);

    Ok(tracer)
}

fn init_metrics(config: &ObservabilityConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();

    let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    global::set_meter_provider(provider);
    Ok(())
}

/// Install the JSON fmt layer, the env filter, and (when traces are on) the
/// OpenTelemetry layer
fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    // Each arm builds its own fmt layer; the layer type depends on the
    // subscriber stack it is attached to
    match tracer {
        Some(tracer) => {
            let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .json();
            tracing_subscriber::registry()
                .with(telemetry_layer)
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        None => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .json();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}

/// Flush telemetry before exit
///
/// SDK providers flush on drop; this marks the shutdown in the logs.
pub fn shutdown_observability() {
    tracing::info!("Shutting down OpenTelemetry");
}
