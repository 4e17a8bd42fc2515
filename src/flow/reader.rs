//! The upstream reader seen from the sink.

use super::backpressure::FlowDecision;

/// An upstream source the sink can pause and resume.
///
/// The sink issues a decision on every backpressure evaluation, so
/// implementations must treat a repeated `pause` or `resume` as a no-op.
/// The reader's one-time "finished" notification is delivered by finishing
/// (or dropping) the [`SinkHandle`](crate::sink::SinkHandle).
pub trait Reader: Send + 'static {
    fn pause(&mut self);

    fn resume(&mut self);

    /// Apply a controller decision.
    fn apply(&mut self, decision: FlowDecision) {
        match decision {
            FlowDecision::Pause => self.pause(),
            FlowDecision::Resume => self.resume(),
        }
    }
}
