//! The flow-controlled batching sink.
//!
//! Provides:
//! - Batch accumulation into fixed-size batches
//! - A synchronous state machine for queueing, single-flight dispatch,
//!   backpressure and draining
//! - A tokio task driving that machine against a reader and a handler

pub mod batch;
pub mod driver;
pub mod handler;
pub mod machine;

pub use batch::{Batch, BatchKind};
pub use driver::{spawn, DrainHandle, SinkBuilder, SinkHandle};
pub use handler::BatchHandler;
pub use machine::{Completion, DrainReport, FailurePolicy, SinkConfig, SinkCore, SinkState, Step};
