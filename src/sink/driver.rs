//! Sink task: owns the state machine and performs its side effects.
//!
//! One tokio task per sink:
//! - Producers send units over an unbounded channel (push never blocks;
//!   the reader is throttled through pause/resume instead)
//! - The in-flight handler future is polled alongside the channel
//! - Every transition's [`Step`] is applied in order: reader, handler, completion

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use super::handler::BatchHandler;
use super::machine::{Completion, SinkConfig, SinkCore, Step};
use crate::error::SinkError;
use crate::flow::backpressure::FlowDecision;
use crate::flow::reader::Reader;
use crate::observability::metrics;

type CompletionCallback = Box<dyn FnOnce(&Completion) + Send + 'static>;

/// Handler invocation in progress: batch sequence, outcome, latency.
type InFlight = BoxFuture<'static, (u64, anyhow::Result<()>, Duration)>;

enum Command<T> {
    Push(T),
    Finish,
}

/// Spawn a sink with default options.
///
/// Must be called from within a Tokio runtime.
pub fn spawn<T, R, H>(
    config: SinkConfig,
    reader: R,
    handler: H,
) -> Result<(SinkHandle<T>, DrainHandle), SinkError>
where
    T: Send + 'static,
    R: Reader,
    H: BatchHandler<T>,
{
    SinkBuilder::new(config).spawn(reader, handler)
}

/// Builder for a sink task.
pub struct SinkBuilder {
    config: SinkConfig,
    on_complete: Option<CompletionCallback>,
}

impl SinkBuilder {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            on_complete: None,
        }
    }

    /// Run `callback` exactly once, when the sink terminates.
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Completion) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Validate the config and start the sink task.
    pub fn spawn<T, R, H>(
        self,
        reader: R,
        handler: H,
    ) -> Result<(SinkHandle<T>, DrainHandle), SinkError>
    where
        T: Send + 'static,
        R: Reader,
        H: BatchHandler<T>,
    {
        let core = SinkCore::new(self.config)?;
        let sink_id = Uuid::now_v7();
        let (tx, rx) = mpsc::unbounded_channel();

        let task = SinkTask {
            label: sink_id.to_string(),
            core,
            reader,
            handler,
            on_complete: self.on_complete,
        };
        let span = tracing::debug_span!(
            "sink",
            %sink_id,
            buffer_size = self.config.buffer_size,
            queue_limit = self.config.queue_limit
        );
        let join = tokio::spawn(task.run(rx).instrument(span));

        Ok((SinkHandle { sink_id, tx }, DrainHandle { sink_id, join }))
    }
}

/// Producer side of a sink.
///
/// Finishing (or dropping) the handle is the reader's one-time "finished"
/// notification.
#[derive(Debug)]
pub struct SinkHandle<T> {
    sink_id: Uuid,
    tx: UnboundedSender<Command<T>>,
}

impl<T> SinkHandle<T> {
    /// Add one unit to the open batch.
    ///
    /// Fails with [`SinkError::Closed`] if the sink already terminated.
    pub fn push(&self, unit: T) -> Result<(), SinkError> {
        self.tx
            .send(Command::Push(unit))
            .map_err(|_| SinkError::Closed)
    }

    /// Signal that the reader finished. The open batch is flushed and the
    /// sink drains.
    pub fn finish(self) {
        // A terminated sink has nothing left to drain.
        let _ = self.tx.send(Command::Finish);
    }

    pub fn sink_id(&self) -> Uuid {
        self.sink_id
    }

    /// Whether the sink task has terminated.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Resolves with the sink's completion.
#[derive(Debug)]
pub struct DrainHandle {
    sink_id: Uuid,
    join: JoinHandle<Completion>,
}

impl DrainHandle {
    pub fn sink_id(&self) -> Uuid {
        self.sink_id
    }

    /// Whether the sink task has terminated.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Future for DrainHandle {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.join).poll(cx).map(|joined| match joined {
            Ok(completion) => completion,
            Err(e) if e.is_panic() => Err(SinkError::TaskPanicked),
            Err(_) => Err(SinkError::ChannelClosed),
        })
    }
}

struct SinkTask<T, R, H> {
    label: String,
    core: SinkCore<T>,
    reader: R,
    handler: H,
    on_complete: Option<CompletionCallback>,
}

impl<T, R, H> SinkTask<T, R, H>
where
    T: Send + 'static,
    R: Reader,
    H: BatchHandler<T>,
{
    async fn run(mut self, mut rx: UnboundedReceiver<Command<T>>) -> Completion {
        let mut in_flight: Option<InFlight> = None;
        let mut accepting = true;
        tracing::debug!("Sink started");

        loop {
            let step = tokio::select! {
                (seq, outcome, latency) = wait_in_flight(&mut in_flight), if in_flight.is_some() => {
                    metrics::record_handler_outcome(&self.label, latency.as_secs_f64(), outcome.is_ok());
                    tracing::debug!(seq, latency_ms = latency.as_secs_f64() * 1000.0, ok = outcome.is_ok(), "Handler returned");
                    self.core.handler_done(outcome)
                }
                command = rx.recv(), if accepting => match command {
                    Some(Command::Push(unit)) => self.core.push(unit),
                    Some(Command::Finish) | None => {
                        accepting = false;
                        Ok(self.core.close())
                    }
                },
                else => {
                    tracing::error!(state = ?self.core.state(), "Sink stalled with no pending event");
                    return self.finish(Err(SinkError::ChannelClosed));
                }
            };

            match step {
                Ok(step) => {
                    if let Some(completion) = self.apply(step, &mut in_flight) {
                        return self.finish(completion);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Sink event rejected"),
            }
        }
    }

    /// Perform a transition's side effects. Returns the completion, if any.
    fn apply(&mut self, step: Step<T>, in_flight: &mut Option<InFlight>) -> Option<Completion> {
        if let Some(decision) = step.flow {
            tracing::debug!(?decision, pending = self.core.pending_len(), "Reader flow decision");
            self.reader.apply(decision);
            metrics::record_backpressure(&self.label, decision == FlowDecision::Pause);
        }

        if let Some(batch) = step.dispatch {
            let seq = batch.seq();
            metrics::record_dispatch(&self.label, batch.len());
            let started = Instant::now();
            let invocation = self.handler.handle(batch);
            *in_flight = Some(Box::pin(async move {
                let outcome = invocation.await;
                (seq, outcome, started.elapsed())
            }));
        }

        metrics::record_queue_depth(&self.label, self.core.pending_len());
        step.completion
    }

    fn finish(mut self, completion: Completion) -> Completion {
        if let Some(callback) = self.on_complete.take() {
            callback(&completion);
        }
        completion
    }
}

/// Await the in-flight invocation, clearing the slot once it resolves.
async fn wait_in_flight(slot: &mut Option<InFlight>) -> (u64, anyhow::Result<()>, Duration) {
    match slot.as_mut() {
        Some(invocation) => {
            let output = invocation.await;
            *slot = None;
            output
        }
        None => std::future::pending().await,
    }
}
