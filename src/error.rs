//! Error types for the batching sink.

use serde::Serialize;
use thiserror::Error;

/// Error type for sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid sink configuration: {0}")]
    InvalidConfig(String),

    /// The reader already finished (or the sink terminated) and no more units are accepted.
    #[error("sink is closed")]
    Closed,

    /// A handler completion arrived while no batch was in flight.
    #[error("handler completion received with no batch in flight")]
    UnexpectedCompletion,

    /// The handler failed under the abort policy.
    #[error("batch {seq} failed, draining aborted: {message}")]
    HandlerFailed { seq: u64, message: String },

    #[error("sink task panicked")]
    TaskPanicked,

    /// The sink task stopped without producing a completion.
    #[error("sink channel closed")]
    ChannelClosed,
}

/// A batch the handler reported as failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("batch {seq}: {message}")]
pub struct HandlerError {
    /// Sequence number of the failed batch.
    pub seq: u64,
    /// Rendered error chain returned by the handler.
    pub message: String,
}

impl HandlerError {
    /// Capture a handler failure for the batch with sequence `seq`.
    pub fn new(seq: u64, err: &anyhow::Error) -> Self {
        Self {
            seq,
            message: format!("{err:#}"),
        }
    }
}

impl From<HandlerError> for SinkError {
    fn from(err: HandlerError) -> Self {
        SinkError::HandlerFailed {
            seq: err.seq,
            message: err.message,
        }
    }
}
