//! Queue-length backpressure decisions.
//!
//! A batch in flight is not counted in the queue length but is still
//! buffered work, so the pause threshold is one lower while busy:
//! - In flight: pause when `queue_len >= queue_limit`
//! - Idle: pause when `queue_len > queue_limit`

use serde::{Deserialize, Serialize};

/// Instruction for the upstream reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDecision {
    Pause,
    Resume,
}

/// When the sink re-evaluates backpressure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackpressureMode {
    /// Evaluate only while batches are queued, before dispatching.
    ///
    /// A queue that drains to empty does not re-assert `resume`; the reader
    /// keeps the last decision until the next enqueue.
    #[default]
    Lazy,
    /// Evaluate after every queue-length change, including the one that
    /// empties the queue.
    Eager,
}

/// Backpressure controller for one sink.
#[derive(Debug)]
pub struct BackpressureController {
    queue_limit: usize,
    last: Option<FlowDecision>,
}

impl BackpressureController {
    /// Create a controller with the given queue limit.
    pub fn new(queue_limit: usize) -> Self {
        Self {
            queue_limit,
            last: None,
        }
    }

    /// Decide whether the reader should be paused.
    ///
    /// Records the decision so [`is_paused`](Self::is_paused) reflects the
    /// state the reader was last told to be in.
    pub fn evaluate(&mut self, queue_len: usize, in_flight: bool) -> FlowDecision {
        let decision = Self::decide(self.queue_limit, queue_len, in_flight);
        self.last = Some(decision);
        decision
    }

    /// Pause the reader unconditionally.
    pub fn force_pause(&mut self) -> FlowDecision {
        self.last = Some(FlowDecision::Pause);
        FlowDecision::Pause
    }

    /// Pure threshold rule.
    pub fn decide(queue_limit: usize, queue_len: usize, in_flight: bool) -> FlowDecision {
        let over = if in_flight {
            queue_len >= queue_limit
        } else {
            queue_len > queue_limit
        };
        if over {
            FlowDecision::Pause
        } else {
            FlowDecision::Resume
        }
    }

    /// Whether the last decision was `Pause`.
    pub fn is_paused(&self) -> bool {
        self.last == Some(FlowDecision::Pause)
    }

    /// The last decision, if any evaluation happened yet.
    pub fn last_decision(&self) -> Option<FlowDecision> {
        self.last
    }

    pub fn queue_limit(&self) -> usize {
        self.queue_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_threshold_is_exclusive() {
        assert_eq!(BackpressureController::decide(1, 1, false), FlowDecision::Resume);
        assert_eq!(BackpressureController::decide(1, 2, false), FlowDecision::Pause);
    }

    #[test]
    fn test_busy_threshold_is_inclusive() {
        assert_eq!(BackpressureController::decide(1, 0, true), FlowDecision::Resume);
        assert_eq!(BackpressureController::decide(1, 1, true), FlowDecision::Pause);
    }

    #[test]
    fn test_zero_limit_pauses_whenever_busy() {
        assert_eq!(BackpressureController::decide(0, 0, true), FlowDecision::Pause);
        assert_eq!(BackpressureController::decide(0, 0, false), FlowDecision::Resume);
        assert_eq!(BackpressureController::decide(0, 1, false), FlowDecision::Pause);
    }

    #[test]
    fn test_never_resumes_over_limit() {
        for limit in 0..5 {
            for len in 0..10 {
                if len >= limit {
                    assert_eq!(
                        BackpressureController::decide(limit, len, true),
                        FlowDecision::Pause
                    );
                }
                if len > limit {
                    assert_eq!(
                        BackpressureController::decide(limit, len, false),
                        FlowDecision::Pause
                    );
                }
            }
        }
    }

    #[test]
    fn test_tracks_last_decision() {
        let mut controller = BackpressureController::new(2);
        assert_eq!(controller.last_decision(), None);
        assert!(!controller.is_paused());

        controller.evaluate(3, false);
        assert!(controller.is_paused());

        controller.evaluate(1, true);
        assert!(!controller.is_paused());

        controller.force_pause();
        assert_eq!(controller.last_decision(), Some(FlowDecision::Pause));
    }
}
