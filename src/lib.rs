//! flowsink: a flow-controlled batching sink.
//!
//! Units pushed by a producer are grouped into fixed-size batches, queued,
//! and handed one at a time to an asynchronous handler. When the queue grows
//! past its limit the upstream reader is paused, bounding memory when the
//! producer outpaces the consumer.
//!
//! # Architecture
//!
//! - **Explicit state machine**: `Idle`, `Dispatching`, `Draining`, `Completed`
//! - **Single-flight dispatch**: at most one handler invocation at a time, FIFO
//! - **Reader backpressure**: pause/resume thresholds on the pending queue
//! - **Observable**: tracing spans per sink and OpenTelemetry metrics
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Sink and handler error types
//! - [`flow`]: Backpressure decisions, the reader capability, pause gate
//! - [`observability`]: Metrics and tracing setup
//! - [`pipeline`]: Newline-delimited input to JSON-lines output
//! - [`sink`]: Batching, the state machine and its tokio driver
//!
//! # Example
//!
//! ```no_run
//! use flowsink::flow::gate::pause_gate;
//! use flowsink::sink::{self, Batch, SinkConfig};
//!
//! # async fn run() -> Result<(), flowsink::SinkError> {
//! let (gate, _waiter) = pause_gate();
//! let handler = |batch: Batch<u32>| async move {
//!     println!("batch {} has {} units", batch.seq(), batch.len());
//!     anyhow::Ok(())
//! };
//! let (handle, drain) = sink::spawn(SinkConfig::new(10, 2), gate, handler)?;
//! for i in 0..25 {
//!     handle.push(i)?;
//! }
//! handle.finish();
//! let report = drain.await?;
//! assert_eq!(report.units_dispatched, 25);
//! # Ok(())
//! # }
//! ```

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // sink::SinkConfig is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc,      // Panic docs can be verbose
    clippy::len_without_is_empty     // Batch types expose both where it matters
)]

pub mod config;
pub mod error;
pub mod flow;
pub mod observability;
pub mod pipeline;
pub mod sink;

pub use error::{HandlerError, SinkError};
pub use flow::backpressure::{BackpressureMode, FlowDecision};
pub use flow::reader::Reader;
pub use sink::{Batch, BatchHandler, DrainHandle, DrainReport, SinkConfig, SinkHandle};
