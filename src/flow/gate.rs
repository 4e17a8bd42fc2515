//! Pause gate connecting sink backpressure to a producer task.
//!
//! Uses tokio::sync::watch so the producer only sees the latest state:
//! - The sink owns the [`GateController`] (a [`Reader`])
//! - The producer awaits [`GateWaiter::wait_resumed`] before reading more

use tokio::sync::watch::{self, Receiver, Sender};

use super::reader::Reader;

/// Create a connected controller/waiter pair, initially open.
#[must_use]
pub fn pause_gate() -> (GateController, GateWaiter) {
    let (sender, receiver) = watch::channel(false);
    (GateController { sender }, GateWaiter { receiver })
}

/// Sink side of the gate.
#[derive(Debug)]
pub struct GateController {
    sender: Sender<bool>,
}

impl GateController {
    /// Whether the gate is currently closed.
    pub fn is_paused(&self) -> bool {
        *self.sender.borrow()
    }

    fn set_paused(&self, paused: bool) {
        // Only wake waiters on an actual transition.
        let changed = self.sender.send_if_modified(|current| {
            if *current == paused {
                false
            } else {
                *current = paused;
                true
            }
        });
        if changed {
            tracing::trace!(paused, "Reader gate toggled");
        }
    }
}

impl Reader for GateController {
    fn pause(&mut self) {
        self.set_paused(true);
    }

    fn resume(&mut self) {
        self.set_paused(false);
    }
}

/// Producer side of the gate.
#[derive(Debug, Clone)]
pub struct GateWaiter {
    receiver: Receiver<bool>,
}

impl GateWaiter {
    pub fn is_paused(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until the gate is open.
    ///
    /// Returns immediately if it already is. If the controller was dropped
    /// (the sink is gone) the gate counts as open so the producer can observe
    /// the closed sink on its next push.
    pub async fn wait_resumed(&mut self) {
        let _ = self.receiver.wait_for(|paused| !*paused).await;
    }
}
