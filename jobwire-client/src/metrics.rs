//! Client metrics definitions
//!
//! OpenTelemetry instruments for monitoring the job-service client. They are
//! exported through whatever meter provider the application installed (see
//! [`jobwire_core::init_observability`]).
//!
//! # Metrics Collected
//!
//! - **requests_total**: request/response calls by method and outcome (counter)
//! - **request_duration**: call latency (histogram)
//! - **errors_total**: classified errors by kind (counter)
//! - **retries_total**: retries scheduled by the facade (counter)
//! - **streams_open**: open event streams per scope kind (up/down counter)
//! - **reconnection_attempts**: reconnects scheduled per scope (counter)
//! - **stream_events_received**: decoded inbound frames per scope (counter)

use jobwire_core::ConnectionScope;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, UpDownCounter},
    KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Request/response calls
    pub requests_total: Counter<u64>,
    /// Request duration in seconds
    pub request_duration: Histogram<f64>,
    /// Classified errors
    pub errors_total: Counter<u64>,
    /// Retries scheduled
    pub retries_total: Counter<u64>,
    /// Event streams currently open
    pub streams_open: UpDownCounter<i64>,
    /// Reconnects scheduled
    pub reconnection_attempts: Counter<u64>,
    /// Inbound frames decoded
    pub stream_events_received: Counter<u64>,
}

impl ClientMetrics {
    /// Create metrics from the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics with a custom meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("jobwire.client.requests.total")
                .with_description("Total number of request/response calls")
                .build(),
            request_duration: meter
                .f64_histogram("jobwire.client.request.duration")
                .with_description("Request duration in seconds")
                .build(),
            errors_total: meter
                .u64_counter("jobwire.client.errors.total")
                .with_description("Total number of classified errors")
                .build(),
            retries_total: meter
                .u64_counter("jobwire.client.retries.total")
                .with_description("Total number of retries scheduled")
                .build(),
            streams_open: meter
                .i64_up_down_counter("jobwire.client.streams.open")
                .with_description("Number of event streams currently open")
                .build(),
            reconnection_attempts: meter
                .u64_counter("jobwire.client.reconnection.attempts")
                .with_description("Total number of reconnects scheduled")
                .build(),
            stream_events_received: meter
                .u64_counter("jobwire.client.stream.events.received")
                .with_description("Total number of stream frames decoded")
                .build(),
        }
    }

    /// Record a finished request
    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    /// Record a classified error
    pub fn record_error(&self, kind: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_kind", kind.to_string())]);
    }

    /// Record a retry of a named facade operation
    pub fn record_retry(&self, operation: &str) {
        self.retries_total
            .add(1, &[KeyValue::new("operation", operation.to_string())]);
    }

    /// Record a stream reaching `Open`
    pub fn record_stream_opened(&self, scope: &ConnectionScope) {
        self.streams_open.add(1, &[scope_attribute(scope)]);
    }

    /// Record an open stream ending
    ///
    /// Pair with exactly one earlier [`ClientMetrics::record_stream_opened`].
    pub fn record_stream_closed(&self, scope: &ConnectionScope) {
        self.streams_open.add(-1, &[scope_attribute(scope)]);
    }

    /// Record a scheduled reconnect
    pub fn record_reconnection_attempt(&self, scope: &ConnectionScope) {
        self.reconnection_attempts.add(1, &[scope_attribute(scope)]);
    }

    /// Record a decoded inbound frame
    pub fn record_stream_event(&self, scope: &ConnectionScope) {
        self.stream_events_received.add(1, &[scope_attribute(scope)]);
    }
}

// Job ids are not used as attribute values to keep cardinality bounded
fn scope_attribute(scope: &ConnectionScope) -> KeyValue {
    let kind = match scope {
        ConnectionScope::Global => "global",
        ConnectionScope::Job(_) => "job",
    };
    KeyValue::new("scope", kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ClientMetrics::new("test-client");

        metrics.record_request("GET", "success", 0.05);
        metrics.record_error("server_error");
        metrics.record_retry("list_jobs");
        metrics.record_reconnection_attempt(&ConnectionScope::Global);
        metrics.record_stream_event(&ConnectionScope::job("1"));
    }

    #[test]
    fn test_open_streams_add_up_across_jobs() {
        use opentelemetry::metrics::MeterProvider as _;
        use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData};
        use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};

        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter.clone()).build())
            .build();
        let metrics = ClientMetrics::new_with_meter(&provider.meter("jobwire-test"));

        metrics.record_stream_opened(&ConnectionScope::Global);
        metrics.record_stream_opened(&ConnectionScope::job("a"));
        metrics.record_stream_opened(&ConnectionScope::job("b"));
        metrics.record_stream_opened(&ConnectionScope::job("c"));
        metrics.record_stream_closed(&ConnectionScope::job("b"));

        provider.force_flush().unwrap();
        let exported = exporter.get_finished_metrics().unwrap();
        let resource = exported.last().unwrap();

        let mut open = Vec::new();
        for metric in resource.scope_metrics().flat_map(|scope| scope.metrics()) {
            if metric.name() != "jobwire.client.streams.open" {
                continue;
            }
            let AggregatedMetrics::I64(MetricData::Sum(sum)) = metric.data() else {
                panic!("streams_open should be an i64 sum");
            };
            for point in sum.data_points() {
                let kind = point
                    .attributes()
                    .find(|kv| kv.key.as_str() == "scope")
                    .map(|kv| kv.value.as_str().into_owned())
                    .unwrap();
                open.push((kind, point.value()));
            }
        }
        open.sort();

        assert_eq!(open, vec![("global".to_string(), 1), ("job".to_string(), 2)]);
    }
}
