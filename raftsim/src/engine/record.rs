//! Bounded in-memory records of recent activity and run counters.
//!
//! These back the observation snapshot. They are separate from `tracing`
//! output: tracing is for operators reading logs, records are for the
//! control plane.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::event::DropReason;
use crate::types::{Message, MessageType, NodeId};

/// Default capacity of each bounded record.
pub const DEFAULT_RECORD_CAPACITY: usize = 1000;

/// A FIFO that evicts its oldest entry once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> BoundedLog<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_RECORD_CAPACITY)),
            capacity,
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Copy the entries out, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

/// What happened to a message at the moment it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageOutcome {
    Sent,
    Dropped(DropReason),
    Delivered,
    /// The destination was crashed (or gone) when the message arrived.
    Undeliverable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub timestamp: f64,
    pub src: NodeId,
    pub dst: NodeId,
    pub message_type: MessageType,
    pub term: u64,
    pub outcome: MessageOutcome,
}

impl MessageRecord {
    #[must_use]
    pub fn new(timestamp: f64, message: &Message, outcome: MessageOutcome) -> Self {
        Self {
            timestamp,
            src: message.src.clone(),
            dst: message.dst.clone(),
            message_type: message.message_type(),
            term: message.body.term(),
            outcome,
        }
    }
}

/// Domain-level happenings worth showing to an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEventKind {
    NodeCrash,
    NodeRecover,
    BecameFollower,
    BecameCandidate,
    BecameLeader,
    CommandSubmitted,
    EntriesCommitted,
    PartitionStarted,
    PartitionHealed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub timestamp: f64,
    pub kind: DomainEventKind,
    pub node: Option<NodeId>,
    pub detail: String,
}

/// Counters for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub events_processed: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub messages_duplicated: u64,
    pub messages_delivered: u64,
    pub messages_undeliverable: u64,
    /// Calls rejected at the API boundary.
    pub validation_errors: u64,
    /// Stale, unexpected, or unroutable input that was logged and dropped.
    pub protocol_anomalies: u64,
    /// Errors or panics raised inside node handlers.
    pub node_faults: u64,
}

/// Everything the engine remembers for observers.
#[derive(Debug, Clone)]
pub struct Recorder {
    messages: BoundedLog<MessageRecord>,
    events: BoundedLog<DomainEvent>,
    stats: RunStats,
}

impl Recorder {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: BoundedLog::new(capacity),
            events: BoundedLog::new(capacity),
            stats: RunStats::default(),
        }
    }

    pub fn record_message(&mut self, timestamp: f64, message: &Message, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Sent => self.stats.messages_sent += 1,
            MessageOutcome::Dropped(_) => self.stats.messages_dropped += 1,
            MessageOutcome::Delivered => self.stats.messages_delivered += 1,
            MessageOutcome::Undeliverable => self.stats.messages_undeliverable += 1,
        }
        self.messages
            .push(MessageRecord::new(timestamp, message, outcome));
    }

    pub fn record_event(
        &mut self,
        timestamp: f64,
        kind: DomainEventKind,
        node: Option<NodeId>,
        detail: impl Into<String>,
    ) {
        self.events.push(DomainEvent {
            timestamp,
            kind,
            node,
            detail: detail.into(),
        });
    }

    #[must_use]
    pub const fn messages(&self) -> &BoundedLog<MessageRecord> {
        &self.messages
    }

    #[must_use]
    pub const fn events(&self) -> &BoundedLog<DomainEvent> {
        &self.events
    }

    #[must_use]
    pub const fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub const fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageBody;

    #[test]
    fn test_bounded_log_evicts_oldest() {
        let mut log = BoundedLog::new(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.to_vec(), vec![2, 3, 4]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_bounded_log_zero_capacity_keeps_nothing() {
        let mut log = BoundedLog::new(0);
        log.push("ignored");
        assert!(log.is_empty());
    }

    #[test]
    fn test_recorder_counts_outcomes() {
        let mut recorder = Recorder::new(10);
        let message = Message::new(
            NodeId::from("a"),
            NodeId::from("b"),
            MessageBody::RequestVoteResponse {
                term: 1,
                vote_granted: false,
            },
        );

        recorder.record_message(0.0, &message, MessageOutcome::Sent);
        recorder.record_message(0.0, &message, MessageOutcome::Dropped(DropReason::Random));
        recorder.record_message(0.0, &message, MessageOutcome::Sent);
        recorder.record_message(0.1, &message, MessageOutcome::Delivered);

        let stats = recorder.stats();
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.messages_dropped, 1);
        assert_eq!(stats.messages_delivered, 1);
        assert_eq!(recorder.messages().len(), 4);
    }

    #[test]
    fn test_recorder_events_are_bounded() {
        let mut recorder = Recorder::new(2);
        for i in 0..4 {
            recorder.record_event(
                f64::from(i),
                DomainEventKind::NodeCrash,
                Some(NodeId::from("a")),
                "crash",
            );
        }
        let events = recorder.events().to_vec();
        assert_eq!(events.len(), 2);
        assert!((events[0].timestamp - 2.0).abs() < f64::EPSILON);
    }
}
