//! Min-priority queue of scheduled events.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::error::SimulationError;
use super::event::{Event, EventKind};

/// Event queue ordered by `(timestamp, sequence)`.
///
/// # Invariants
///
/// - Every queued event has a finite, non-negative timestamp.
/// - Sequence numbers are assigned in scheduling order and never reused.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
    next_sequence: u64,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule an event and return the sequence number it was given.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::InvalidEvent` if `timestamp` is negative,
    /// NaN, or infinite. Rejected events do not consume a sequence number.
    pub fn schedule(&mut self, timestamp: f64, kind: EventKind) -> Result<u64, SimulationError> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(SimulationError::InvalidEvent { timestamp });
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let event = Event::new(timestamp, sequence, kind);
        tracing::trace!("scheduled {event} (seq {sequence})");
        self.heap.push(Reverse(event));
        Ok(sequence)
    }

    /// Remove and return the earliest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|Reverse(event)| event)
    }

    /// Timestamp of the earliest event, if any.
    #[must_use]
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(event)| event.timestamp())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Total number of events ever scheduled.
    #[must_use]
    pub const fn scheduled_count(&self) -> u64 {
        self.next_sequence
    }
}
