//! Events scheduled on the virtual clock.
//!
//! An [`Event`] is created only by the [`EventQueue`](super::EventQueue),
//! which stamps it with a sequence number. Events are ordered by
//! `(timestamp, sequence)`, a strict total order: two events with the same
//! timestamp are dispatched in the order they were scheduled.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Message, NodeId};

/// Timer variants a node can arm through
/// [`NodeContext::schedule_timeout`](super::NodeContext::schedule_timeout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timer {
    /// Wake-up to check the election deadline.
    Election,
    /// Leader heartbeat tick, tagged with the term that armed it.
    Heartbeat { term: u64 },
    /// Any other node-defined timer.
    Custom { tag: String, data: Option<String> },
}

/// Why the transport discarded a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// Lost to the configured drop rate.
    Random,
    /// Endpoints are on different sides of an active partition.
    Partition,
}

/// What an event does when dispatched, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Observability only: a message entered the transport.
    MessageSent(Message),
    /// Observability only: a message was lost and will never be delivered.
    MessageDropped { message: Message, reason: DropReason },
    /// A message arrives at its destination.
    MessageDelivered(Message),
    /// A timer armed by `node` expires.
    Timeout { node: NodeId, timer: Timer },
    NodeCrash { node: NodeId },
    NodeRecover { node: NodeId },
    /// Split the network into groups that cannot talk to each other.
    PartitionStart { groups: Vec<Vec<NodeId>> },
    /// Remove any active partition.
    PartitionHeal,
}

impl EventKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MessageSent(_) => "MessageSent",
            Self::MessageDropped { .. } => "MessageDropped",
            Self::MessageDelivered(_) => "MessageDelivered",
            Self::Timeout {
                timer: Timer::Election,
                ..
            } => "ElectionTimeout",
            Self::Timeout {
                timer: Timer::Heartbeat { .. },
                ..
            } => "HeartbeatTimeout",
            Self::Timeout { .. } => "Timeout",
            Self::NodeCrash { .. } => "NodeCrash",
            Self::NodeRecover { .. } => "NodeRecover",
            Self::PartitionStart { .. } => "PartitionStart",
            Self::PartitionHeal => "PartitionHeal",
        }
    }
}

/// A scheduled event. Immutable once created.
#[derive(Debug, Clone)]
pub struct Event {
    timestamp: f64,
    sequence: u64,
    kind: EventKind,
}

impl Event {
    pub(super) const fn new(timestamp: f64, sequence: u64, kind: EventKind) -> Self {
        Self {
            timestamp,
            sequence,
            kind,
        }
    }

    #[must_use]
    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }

    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }

    #[must_use]
    pub fn into_kind(self) -> EventKind {
        self.kind
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then(self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event({} at {:.3})", self.kind.name(), self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crash(node: &str) -> EventKind {
        EventKind::NodeCrash {
            node: NodeId::from(node),
        }
    }

    #[test]
    fn test_event_ordering_by_timestamp() {
        let earlier = Event::new(1.0, 5, crash("a"));
        let later = Event::new(2.0, 1, crash("a"));
        assert!(earlier < later);
    }

    #[test]
    fn test_event_ordering_ties_broken_by_sequence() {
        let first = Event::new(1.0, 1, crash("a"));
        let second = Event::new(1.0, 2, crash("b"));
        assert!(first < second);
        assert_ne!(first, second);
    }

    #[test]
    fn test_event_kind_names() {
        let timeout = EventKind::Timeout {
            node: NodeId::from("a"),
            timer: Timer::Heartbeat { term: 3 },
        };
        assert_eq!(timeout.name(), "HeartbeatTimeout");
        assert_eq!(EventKind::PartitionHeal.name(), "PartitionHeal");
    }

    #[test]
    fn test_event_display() {
        let event = Event::new(1.5, 0, crash("a"));
        assert_eq!(event.to_string(), "Event(NodeCrash at 1.500)");
    }
}
