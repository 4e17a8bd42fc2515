//! Line pipeline: newline-delimited input through a sink into JSON lines.
//!
//! The producer loop waits on a pause gate before every line, so the sink's
//! backpressure bounds how far reading runs ahead of writing. Each batch is
//! written as one JSON object per line.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::config::Config;
use crate::flow::gate::{pause_gate, GateWaiter};
use crate::sink::{self, Batch, BatchKind, DrainReport};

/// One output line.
#[derive(Serialize)]
struct BatchRecord<'a> {
    seq: u64,
    kind: BatchKind,
    units: &'a [String],
}

/// Feed `input` through a sink configured by `config`, writing batches to `output`.
///
/// Stops reading early when `shutdown_rx` flips to `true`; whatever was read
/// is still drained. Returns the drain report once the handler finished the
/// last batch.
pub async fn run_pipeline<I, O>(
    config: &Config,
    input: I,
    output: O,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<DrainReport>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let output = Arc::new(Mutex::new(output));
    let delay = config.handler_delay();

    let handler = move |batch: Batch<String>| {
        let output = Arc::clone(&output);
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let record = BatchRecord {
                seq: batch.seq(),
                kind: batch.kind(),
                units: batch.items(),
            };
            let mut line = serde_json::to_vec(&record).context("failed to encode batch")?;
            line.push(b'\n');

            let mut out = output.lock().await;
            out.write_all(&line)
                .await
                .with_context(|| format!("failed to write batch {}", record.seq))?;
            out.flush().await.context("failed to flush output")?;
            anyhow::Ok(())
        }
    };

    let (gate, mut waiter) = pause_gate();
    let (handle, drain) = sink::spawn(config.sink_config(), gate, handler)?;
    tracing::info!(sink_id = %handle.sink_id(), "Pipeline started");

    let mut lines = LinesStream::new(BufReader::new(input).lines());
    let mut read = 0u64;

    let read_result: Result<()> = loop {
        let line = tokio::select! {
            biased;
            () = shutdown_requested(&mut shutdown_rx) => {
                tracing::info!(read, "Shutdown requested, finishing reader early");
                break Ok(());
            }
            line = next_line(&mut waiter, &mut lines) => line,
        };

        match line {
            Some(Ok(line)) => {
                if handle.push(line).is_err() {
                    tracing::debug!(read, "Sink terminated, stopping reader");
                    break Ok(());
                }
                read += 1;
            }
            Some(Err(e)) => break Err(anyhow::Error::new(e).context("failed to read input")),
            None => break Ok(()),
        }
    };

    handle.finish();
    let report = drain.await?;
    read_result?;

    tracing::info!(
        read,
        batches = report.batches_dispatched,
        units = report.units_dispatched,
        failures = report.failed_batches.len(),
        "Pipeline drained"
    );
    Ok(report)
}

/// Wait for the gate to open, then read one line.
async fn next_line<R>(
    waiter: &mut GateWaiter,
    lines: &mut LinesStream<BufReader<R>>,
) -> Option<std::io::Result<String>>
where
    R: AsyncRead + Unpin,
{
    waiter.wait_resumed().await;
    lines.next().await
}

/// Resolves once the shutdown flag is set. Never resolves if the sender is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
