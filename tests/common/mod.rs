//! Test utilities for flowsink tests.
//!
//! Provides:
//! - A reader that records every flow decision
//! - A handler whose invocations the test completes by hand
//! - Temporary input/output files for pipeline runs

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use flowsink::{Batch, BatchHandler, FlowDecision, Reader};
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};

/// Reader that records pause/resume calls in order.
#[derive(Clone, Default)]
pub struct RecordingReader {
    decisions: Arc<Mutex<Vec<FlowDecision>>>,
}

impl RecordingReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<FlowDecision> {
        self.decisions.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<FlowDecision> {
        self.decisions.lock().unwrap().last().copied()
    }
}

impl Reader for RecordingReader {
    fn pause(&mut self) {
        self.decisions.lock().unwrap().push(FlowDecision::Pause);
    }

    fn resume(&mut self) {
        self.decisions.lock().unwrap().push(FlowDecision::Resume);
    }
}

/// One handler invocation awaiting a verdict from the test.
pub struct Invocation<T> {
    pub batch: Batch<T>,
    done: oneshot::Sender<anyhow::Result<()>>,
}

impl<T> Invocation<T> {
    pub fn items(&self) -> &[T] {
        self.batch.items()
    }

    pub fn complete(self) {
        let _ = self.done.send(Ok(()));
    }

    pub fn fail(self, message: &str) {
        let _ = self.done.send(Err(anyhow::anyhow!(message.to_string())));
    }
}

/// Handler that forwards each batch to the test and waits to be completed.
pub fn manual_handler<T: Send + 'static>() -> (
    impl BatchHandler<T>,
    mpsc::UnboundedReceiver<Invocation<T>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |batch: Batch<T>| {
        let (done, verdict) = oneshot::channel();
        let _ = tx.send(Invocation { batch, done });
        async move {
            verdict
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("invocation dropped by test")))
        }
    };
    (handler, rx)
}

/// Test fixture that manages temporary pipeline files.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let input_path = temp_dir.path().join("input.txt");
        let output_path = temp_dir.path().join("output.jsonl");
        Self {
            temp_dir,
            input_path,
            output_path,
        }
    }

    /// Write one unit per line to the input file.
    pub fn write_input<S: AsRef<str>>(&self, lines: &[S]) {
        let mut content = String::new();
        for line in lines {
            content.push_str(line.as_ref());
            content.push('\n');
        }
        std::fs::write(&self.input_path, content).expect("failed to write input");
    }

    /// Parse the JSON-lines output file.
    pub fn read_output(&self) -> Vec<serde_json::Value> {
        std::fs::read_to_string(&self.output_path)
            .expect("failed to read output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("invalid JSON line"))
            .collect()
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a condition to become true with timeout.
///
/// Returns `true` if the condition was met, `false` if the timeout expired.
pub async fn wait_for<F>(timeout: std::time::Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
