//! Batching sink state machine.
//!
//! Every event (`push`, `handler_done`, `close`) is a transition on
//! [`SinkCore`] that returns a [`Step`]: the side effects the driver must
//! perform, in order. The machine never calls the reader or the handler
//! itself, so a handler that completes immediately cannot re-enter it.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::batch::{Batch, BatchAccumulator};
use crate::error::{HandlerError, SinkError};
use crate::flow::backpressure::{BackpressureController, BackpressureMode, FlowDecision};

/// What to do when the handler reports a failed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep draining.
    #[default]
    Continue,
    /// Pause the reader, drop everything buffered and terminate with an error.
    Abort,
}

/// Configuration for one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Units per batch
    pub buffer_size: usize,
    /// Queued batches tolerated before the reader is paused
    pub queue_limit: usize,
    pub failure_policy: FailurePolicy,
    pub backpressure_mode: BackpressureMode,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            queue_limit: 4,
            failure_policy: FailurePolicy::default(),
            backpressure_mode: BackpressureMode::default(),
        }
    }
}

impl SinkConfig {
    /// Create a config with the given batch size and queue limit.
    pub fn new(buffer_size: usize, queue_limit: usize) -> Self {
        Self {
            buffer_size,
            queue_limit,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn with_backpressure_mode(mut self, mode: BackpressureMode) -> Self {
        self.backpressure_mode = mode;
        self
    }

    /// Reject configurations the sink cannot run with.
    pub fn validate(&self) -> Result<(), SinkError> {
        if self.buffer_size == 0 {
            return Err(SinkError::InvalidConfig(
                "buffer_size must be greater than zero".into(),
            ));
        }
        if self.queue_limit == 0 && self.backpressure_mode == BackpressureMode::Lazy {
            tracing::warn!(
                "queue_limit 0 in lazy mode leaves the reader paused once the queue drains"
            );
        }
        Ok(())
    }
}

/// Lifecycle state. The closed flag is `Draining` or `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Open, nothing in flight.
    Idle,
    /// Open, batch `seq` is in the handler.
    Dispatching { seq: u64 },
    /// The reader finished; remaining batches are being handed off.
    Draining { in_flight: Option<u64> },
    /// Completion has been delivered. Terminal.
    Completed,
}

impl SinkState {
    pub fn is_closed(self) -> bool {
        matches!(self, SinkState::Draining { .. } | SinkState::Completed)
    }

    /// Sequence number of the batch in the handler, if any.
    pub fn in_flight(self) -> Option<u64> {
        match self {
            SinkState::Dispatching { seq } => Some(seq),
            SinkState::Draining { in_flight } => in_flight,
            SinkState::Idle | SinkState::Completed => None,
        }
    }
}

/// Totals delivered with the completion.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub batches_dispatched: u64,
    pub units_dispatched: u64,
    /// Batches the handler failed under [`FailurePolicy::Continue`].
    pub failed_batches: Vec<HandlerError>,
}

/// Result delivered exactly once when the sink terminates.
pub type Completion = Result<DrainReport, SinkError>;

/// Side effects of one transition, to be applied in field order.
#[derive(Debug)]
#[must_use]
pub struct Step<T> {
    /// Decision for the reader.
    pub flow: Option<FlowDecision>,
    /// Batch to hand to the handler.
    pub dispatch: Option<Batch<T>>,
    /// Fire the completion.
    pub completion: Option<Completion>,
}

impl<T> Default for Step<T> {
    fn default() -> Self {
        Self {
            flow: None,
            dispatch: None,
            completion: None,
        }
    }
}

impl<T> Step<T> {
    /// True if the transition had no outward effect.
    pub fn is_empty(&self) -> bool {
        self.flow.is_none() && self.dispatch.is_none() && self.completion.is_none()
    }
}

/// Accumulator, pending queue, single-flight dispatch and backpressure for one sink.
#[derive(Debug)]
pub struct SinkCore<T> {
    config: SinkConfig,
    accumulator: BatchAccumulator<T>,
    pending: VecDeque<Batch<T>>,
    controller: BackpressureController,
    state: SinkState,
    report: DrainReport,
}

impl<T> SinkCore<T> {
    /// Create a sink in the `Idle` state.
    pub fn new(config: SinkConfig) -> Result<Self, SinkError> {
        config.validate()?;
        Ok(Self {
            config,
            accumulator: BatchAccumulator::new(config.buffer_size),
            pending: VecDeque::new(),
            controller: BackpressureController::new(config.queue_limit),
            state: SinkState::Idle,
            report: DrainReport::default(),
        })
    }

    /// Append a unit to the open batch.
    ///
    /// Only a push that fills the batch has effects. Fails with
    /// [`SinkError::Closed`] once the reader has finished.
    pub fn push(&mut self, unit: T) -> Result<Step<T>, SinkError> {
        if self.state.is_closed() {
            return Err(SinkError::Closed);
        }
        match self.accumulator.push(unit) {
            Some(batch) => {
                self.enqueue(batch);
                Ok(self.advance())
            }
            None => Ok(Step::default()),
        }
    }

    /// The handler finished the in-flight batch.
    pub fn handler_done(&mut self, outcome: anyhow::Result<()>) -> Result<Step<T>, SinkError> {
        let seq = self
            .state
            .in_flight()
            .ok_or(SinkError::UnexpectedCompletion)?;
        self.state = match self.state {
            SinkState::Draining { .. } => SinkState::Draining { in_flight: None },
            _ => SinkState::Idle,
        };

        if let Err(err) = outcome {
            let failure = HandlerError::new(seq, &err);
            match self.config.failure_policy {
                FailurePolicy::Continue => {
                    tracing::warn!(seq, error = %failure.message, "Batch handler failed, continuing");
                    self.report.failed_batches.push(failure);
                }
                FailurePolicy::Abort => return Ok(self.abort(failure)),
            }
        } else {
            tracing::trace!(seq, "Batch handled");
        }

        Ok(self.advance())
    }

    /// The reader finished producing units.
    ///
    /// Flushes the open batch as the final batch. Completes immediately if
    /// nothing is left to hand off; otherwise the last handler completion
    /// does. A repeated close is ignored.
    pub fn close(&mut self) -> Step<T> {
        let in_flight = match self.state {
            SinkState::Idle => None,
            SinkState::Dispatching { seq } => Some(seq),
            SinkState::Draining { .. } | SinkState::Completed => {
                tracing::warn!("Close notification ignored, sink already closed");
                return Step::default();
            }
        };
        self.state = SinkState::Draining { in_flight };
        tracing::debug!(
            open_units = self.accumulator.len(),
            pending = self.pending.len(),
            in_flight = ?in_flight,
            "Reader finished, draining"
        );

        if let Some(batch) = self.accumulator.flush() {
            self.enqueue(batch);
        }
        self.advance()
    }

    fn enqueue(&mut self, batch: Batch<T>) {
        tracing::debug!(
            seq = batch.seq(),
            kind = ?batch.kind(),
            units = batch.len(),
            pending = self.pending.len() + 1,
            "Batch enqueued"
        );
        self.pending.push_back(batch);
    }

    /// Dispatch sequencer, run whenever the pending queue may have changed.
    fn advance(&mut self) -> Step<T> {
        let mut step = Step::default();
        let eager = self.config.backpressure_mode == BackpressureMode::Eager;

        if self.pending.is_empty() {
            if self.ready_to_complete() {
                step.completion = Some(self.complete());
            } else if eager {
                step.flow = Some(self.evaluate());
            }
            return step;
        }

        if !eager {
            step.flow = Some(self.evaluate());
        }

        if self.state.in_flight().is_none() {
            if let Some(batch) = self.pending.pop_front() {
                let seq = batch.seq();
                self.state = match self.state {
                    SinkState::Draining { .. } => SinkState::Draining {
                        in_flight: Some(seq),
                    },
                    _ => SinkState::Dispatching { seq },
                };
                self.report.batches_dispatched += 1;
                self.report.units_dispatched += batch.len() as u64;
                tracing::debug!(seq, units = batch.len(), pending = self.pending.len(), "Dispatching batch");
                step.dispatch = Some(batch);
            }
        }

        if eager {
            step.flow = Some(self.evaluate());
        }
        step
    }

    fn evaluate(&mut self) -> FlowDecision {
        let in_flight = self.state.in_flight().is_some();
        let decision = self.controller.evaluate(self.pending.len(), in_flight);
        tracing::trace!(?decision, pending = self.pending.len(), in_flight, "Backpressure evaluated");
        decision
    }

    /// Closed, nothing open, queued or in flight.
    fn ready_to_complete(&self) -> bool {
        self.state == (SinkState::Draining { in_flight: None })
            && self.pending.is_empty()
            && self.accumulator.is_empty()
    }

    fn complete(&mut self) -> Completion {
        self.state = SinkState::Completed;
        tracing::info!(
            batches = self.report.batches_dispatched,
            units = self.report.units_dispatched,
            failures = self.report.failed_batches.len(),
            "Sink drained"
        );
        Ok(self.report.clone())
    }

    fn abort(&mut self, failure: HandlerError) -> Step<T> {
        let discarded_batches = self.pending.len();
        let discarded_units =
            self.pending.drain(..).map(|b| b.len()).sum::<usize>() + self.accumulator.discard();
        self.state = SinkState::Completed;
        tracing::warn!(
            seq = failure.seq,
            error = %failure.message,
            discarded_batches,
            discarded_units,
            "Batch handler failed, aborting sink"
        );
        Step {
            flow: Some(self.controller.force_pause()),
            dispatch: None,
            completion: Some(Err(failure.into())),
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Number of closed batches waiting for the handler.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of units in the open batch.
    pub fn open_len(&self) -> usize {
        self.accumulator.len()
    }

    /// Whether the reader was last told to pause.
    pub fn is_reader_paused(&self) -> bool {
        self.controller.is_paused()
    }

    /// Totals so far.
    pub fn report(&self) -> &DrainReport {
        &self.report
    }
}
