//! Batch accumulation for the sink.
//!
//! Units are collected into the open batch until it reaches the configured
//! size. Unlike a group-commit batcher there is no time trigger: a partial
//! batch only leaves the accumulator when the reader finishes.

use serde::Serialize;

/// Why a batch left the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// The batch reached `buffer_size`.
    Full,
    /// The batch was flushed when the reader finished. May be partial.
    Final,
}

/// An ordered group of units handed to the handler as one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    seq: u64,
    kind: BatchKind,
    items: Vec<T>,
}

impl<T> Batch<T> {
    /// Sequence number, starting at 0 and increasing in push order.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Borrow the units in push order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Take ownership of the units.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Accumulator for the open batch.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    buffer_size: usize,
    items: Vec<T>,
    next_seq: u64,
}

impl<T> BatchAccumulator<T> {
    /// Create an accumulator that closes batches at `buffer_size` units.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            items: Vec::with_capacity(buffer_size),
            next_seq: 0,
        }
    }

    /// Add a unit to the open batch.
    ///
    /// Returns the closed batch if this unit filled it.
    pub fn push(&mut self, item: T) -> Option<Batch<T>> {
        self.items.push(item);
        if self.items.len() >= self.buffer_size {
            Some(self.take(BatchKind::Full))
        } else {
            None
        }
    }

    /// Close the open batch early, returning it if it holds any units.
    pub fn flush(&mut self) -> Option<Batch<T>> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.take(BatchKind::Final))
        }
    }

    /// Drop the open batch, returning how many units it held.
    pub fn discard(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }

    fn take(&mut self, kind: BatchKind) -> Batch<T> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let items = std::mem::replace(&mut self.items, Vec::with_capacity(self.buffer_size));
        Batch { seq, kind, items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of units in the open batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}
