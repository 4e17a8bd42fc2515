//! OpenTelemetry metrics for sink activity.
//!
//! Key metrics:
//! - flowsink_batches_dispatched_total: Counter for batches handed to the handler
//! - flowsink_units_dispatched_total: Counter for units handed to the handler
//! - flowsink_handler_failures_total: Counter for failed handler invocations
//! - flowsink_handler_latency_seconds: Histogram for handler latency
//! - flowsink_queue_depth: Gauge for batches waiting in the pending queue
//! - flowsink_backpressure_active: Gauge for reader pause state

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Flowsink metrics registry.
#[derive(Debug)]
pub struct Metrics {
    pub batches_dispatched: Counter<u64>,
    pub units_dispatched: Counter<u64>,
    pub handler_failures: Counter<u64>,
    /// Time from dispatch to handler completion, in seconds.
    pub handler_latency: Histogram<f64>,
    pub queue_depth: Gauge<i64>,
    /// 1 if the reader was last told to pause, 0 otherwise.
    pub backpressure_active: Gauge<i64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            batches_dispatched: meter
                .u64_counter("flowsink_batches_dispatched_total")
                .with_description("Total number of batches handed to the handler")
                .with_unit("1")
                .init(),
            units_dispatched: meter
                .u64_counter("flowsink_units_dispatched_total")
                .with_description("Total number of units handed to the handler")
                .with_unit("1")
                .init(),
            handler_failures: meter
                .u64_counter("flowsink_handler_failures_total")
                .with_description("Total number of failed handler invocations")
                .with_unit("1")
                .init(),
            handler_latency: meter
                .f64_histogram("flowsink_handler_latency_seconds")
                .with_description("Handler latency from dispatch to completion")
                .with_unit("s")
                .init(),
            queue_depth: meter
                .i64_gauge("flowsink_queue_depth")
                .with_description("Closed batches waiting for the handler")
                .with_unit("1")
                .init(),
            backpressure_active: meter
                .i64_gauge("flowsink_backpressure_active")
                .with_description("1 if the reader is paused")
                .with_unit("1")
                .init(),
        }
    }
}

/// How often the OTLP exporter pushes collected metrics.
const EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        global::set_meter_provider(meter_provider(otel_endpoint));
        Metrics::new(&global::meter("flowsink"))
    });
}

/// Build the provider the sink instruments report to.
///
/// Without an endpoint, or if the exporter cannot be built, instruments are
/// backed by a `ManualReader` nobody collects from. Recording stays cheap and
/// the sink never depends on a collector being reachable.
fn meter_provider(otel_endpoint: Option<&str>) -> SdkMeterProvider {
    let resource = Resource::new([KeyValue::new("service.name", "flowsink")]);

    if let Some(endpoint) = otel_endpoint {
        use opentelemetry_otlp::{Protocol, WithExportConfig};

        let built = opentelemetry_otlp::new_pipeline()
            .metrics(opentelemetry_sdk::runtime::Tokio)
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint)
                    .with_protocol(Protocol::Grpc),
            )
            .with_resource(resource.clone())
            .with_period(EXPORT_INTERVAL)
            .build();
        match built {
            Ok(provider) => {
                tracing::info!(endpoint, interval_secs = EXPORT_INTERVAL.as_secs(), "Exporting sink metrics over OTLP");
                return provider;
            }
            Err(e) => {
                tracing::warn!(endpoint, error = %e, "OTLP exporter unavailable, sink metrics stay local");
            }
        }
    }

    SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(ManualReader::builder().build())
        .build()
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

fn sink_attrs(sink_id: &str) -> [KeyValue; 1] {
    [KeyValue::new("sink_id", sink_id.to_string())]
}

/// Record a batch handed to the handler.
pub fn record_dispatch(sink_id: &str, units: usize) {
    if let Some(m) = METRICS.get() {
        let attrs = sink_attrs(sink_id);
        m.batches_dispatched.add(1, &attrs);
        m.units_dispatched.add(units as u64, &attrs);
    }
}

/// Record a finished handler invocation.
pub fn record_handler_outcome(sink_id: &str, latency_seconds: f64, ok: bool) {
    if let Some(m) = METRICS.get() {
        let attrs = sink_attrs(sink_id);
        m.handler_latency.record(latency_seconds, &attrs);
        if !ok {
            m.handler_failures.add(1, &attrs);
        }
    }
}

/// Record the pending queue length.
pub fn record_queue_depth(sink_id: &str, depth: usize) {
    if let Some(m) = METRICS.get() {
        m.queue_depth
            .record(i64::try_from(depth).unwrap_or(i64::MAX), &sink_attrs(sink_id));
    }
}

/// Record the reader pause state.
pub fn record_backpressure(sink_id: &str, active: bool) {
    if let Some(m) = METRICS.get() {
        m.backpressure_active
            .record(i64::from(active), &sink_attrs(sink_id));
    }
}
