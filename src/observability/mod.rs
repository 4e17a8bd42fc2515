//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing-subscriber
//! - OpenTelemetry metrics for sink activity, with optional OTLP export

pub mod metrics;
pub mod tracing;
