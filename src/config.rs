//! Configuration parsing for the flowsink binary.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Sensible defaults for quick start

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::flow::backpressure::BackpressureMode;
use crate::sink::{FailurePolicy, SinkConfig};

/// flowsink: batch newline-delimited input with reader backpressure.
#[derive(Parser, Debug, Clone)]
#[command(name = "flowsink")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Input file with one unit per line (reads stdin if omitted)
    #[arg(short, long, env = "FLOWSINK_INPUT")]
    pub input: Option<PathBuf>,

    /// Units per batch
    #[arg(short, long, env = "FLOWSINK_BUFFER_SIZE", default_value_t = 100)]
    pub buffer_size: usize,

    /// Queued batches tolerated before the reader is paused
    #[arg(short, long, env = "FLOWSINK_QUEUE_LIMIT", default_value_t = 4)]
    pub queue_limit: usize,

    /// Artificial delay per batch in the output handler, in milliseconds
    #[arg(long, env = "FLOWSINK_HANDLER_DELAY_MS", default_value_t = 0)]
    pub handler_delay_ms: u64,

    /// What to do when writing a batch fails
    #[arg(long, env = "FLOWSINK_FAILURE_POLICY", value_enum, default_value_t = FailurePolicy::Continue)]
    pub failure_policy: FailurePolicy,

    /// When backpressure is re-evaluated
    #[arg(long, env = "FLOWSINK_BACKPRESSURE_MODE", value_enum, default_value_t = BackpressureMode::Lazy)]
    pub backpressure_mode: BackpressureMode,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "FLOWSINK_LOG_JSON")]
    pub log_json: bool,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Sink settings derived from this configuration.
    ///
    /// A zero queue limit runs in eager mode: the pipeline's producer waits
    /// on the pause gate, and a lazy sink never reopens it once the queue
    /// is empty.
    pub fn sink_config(&self) -> SinkConfig {
        let mode = if self.queue_limit == 0 && self.backpressure_mode == BackpressureMode::Lazy {
            tracing::warn!("queue_limit 0 requires eager backpressure, switching modes");
            BackpressureMode::Eager
        } else {
            self.backpressure_mode
        };
        SinkConfig::new(self.buffer_size, self.queue_limit)
            .with_failure_policy(self.failure_policy)
            .with_backpressure_mode(mode)
    }

    pub fn handler_delay(&self) -> Duration {
        Duration::from_millis(self.handler_delay_ms)
    }

    /// Create a small configuration for testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            buffer_size: 2,
            queue_limit: 1,
            log_level: "debug".into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: None,
            buffer_size: 100,
            queue_limit: 4,
            handler_delay_ms: 0,
            failure_policy: FailurePolicy::Continue,
            backpressure_mode: BackpressureMode::Lazy,
            log_level: "info".into(),
            log_json: false,
            otel_endpoint: None,
        }
    }
}
