//! Message transport: turns a logical send into scheduled delivery events.
//!
//! # Send pipeline
//!
//! 1. Reject a send time that is negative or not finite.
//! 2. Schedule a `MessageSent` event at the send time (observability only).
//! 3. If an active partition separates the endpoints, schedule
//!    `MessageDropped` and stop.
//! 4. Draw uniform `[0, 1)`; below the drop rate, schedule `MessageDropped`
//!    and stop. A dropped message is lost for good.
//! 5. Otherwise draw a latency from `[min_latency, max_latency]` and
//!    schedule `MessageDelivered` at `now + latency`.
//! 6. With the duplicate rate, schedule one more delivery with an
//!    independently drawn latency.
//!
//! Whether the destination is alive is decided when the delivery event is
//! dispatched, never here.

use std::collections::BTreeSet;

use rand::Rng;
use rand::rngs::StdRng;

use crate::engine::{DropReason, EventKind, EventQueue, SimulationError};
use crate::types::{Message, NodeId};

/// Network behaviour knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Probability in `[0, 1]` that a message is lost.
    pub drop_rate: f64,
    /// Probability in `[0, 1]` that a delivered message arrives twice.
    pub duplicate_rate: f64,
    /// Minimum one-way latency in seconds.
    pub min_latency: f64,
    /// Maximum one-way latency in seconds.
    pub max_latency: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.05,
            duplicate_rate: 0.0,
            min_latency: 0.01,
            max_latency: 0.1,
        }
    }
}

/// A split of the cluster into groups that cannot reach each other.
///
/// Nodes not listed in any group together form one implicit extra group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    groups: Vec<BTreeSet<NodeId>>,
}

impl Partition {
    #[must_use]
    pub fn new(groups: Vec<Vec<NodeId>>) -> Self {
        Self {
            groups: groups
                .into_iter()
                .map(|group| group.into_iter().collect())
                .collect(),
        }
    }

    fn group_of(&self, node: &NodeId) -> Option<usize> {
        self.groups.iter().position(|group| group.contains(node))
    }

    /// Whether a message from `a` to `b` must be dropped.
    #[must_use]
    pub fn separates(&self, a: &NodeId, b: &NodeId) -> bool {
        self.group_of(a) != self.group_of(b)
    }

    #[must_use]
    pub fn groups(&self) -> Vec<Vec<NodeId>> {
        self.groups
            .iter()
            .map(|group| group.iter().cloned().collect())
            .collect()
    }
}

/// Result of a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Dropped(DropReason),
    /// One or two delivery events were scheduled.
    Scheduled { deliveries: u8 },
}

#[derive(Debug, Clone)]
pub struct Transport {
    config: TransportConfig,
    partition: Option<Partition>,
}

impl Transport {
    #[must_use]
    pub const fn new(config: TransportConfig) -> Self {
        Self {
            config,
            partition: None,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Change the drop rate, clamped to `[0, 1]`.
    pub fn set_drop_rate(&mut self, rate: f64) {
        self.config.drop_rate = clamp_probability(rate);
    }

    /// Change the duplicate rate, clamped to `[0, 1]`.
    pub fn set_duplicate_rate(&mut self, rate: f64) {
        self.config.duplicate_rate = clamp_probability(rate);
    }

    pub fn set_partition(&mut self, partition: Option<Partition>) {
        self.partition = partition;
    }

    #[must_use]
    pub const fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    /// Send `message` at time `now`.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::InvalidTimestamp` if `now` is negative or
    /// not finite. Nothing is scheduled in that case.
    pub fn send(
        &self,
        message: Message,
        now: f64,
        rng: &mut StdRng,
        queue: &mut EventQueue,
    ) -> Result<SendOutcome, SimulationError> {
        if !now.is_finite() || now < 0.0 {
            return Err(SimulationError::InvalidTimestamp { timestamp: now });
        }
        tracing::debug!("sending {message}");
        queue.schedule(now, EventKind::MessageSent(message.clone()))?;

        if self
            .partition
            .as_ref()
            .is_some_and(|p| p.separates(&message.src, &message.dst))
        {
            return Self::drop_message(message, now, DropReason::Partition, queue);
        }

        if rng.random::<f64>() < self.config.drop_rate {
            return Self::drop_message(message, now, DropReason::Random, queue);
        }

        let duplicate = rng.random::<f64>() < self.config.duplicate_rate;
        if duplicate {
            let latency = self.draw_latency(rng);
            queue.schedule(now + latency, EventKind::MessageDelivered(message.clone()))?;
        }

        let latency = self.draw_latency(rng);
        tracing::debug!("delivery of {message} at {:.3}", now + latency);
        queue.schedule(now + latency, EventKind::MessageDelivered(message))?;

        Ok(SendOutcome::Scheduled {
            deliveries: if duplicate { 2 } else { 1 },
        })
    }

    fn drop_message(
        message: Message,
        now: f64,
        reason: DropReason,
        queue: &mut EventQueue,
    ) -> Result<SendOutcome, SimulationError> {
        tracing::debug!("dropping {message} ({reason:?})");
        queue.schedule(now, EventKind::MessageDropped { message, reason })?;
        Ok(SendOutcome::Dropped(reason))
    }

    fn draw_latency(&self, rng: &mut StdRng) -> f64 {
        let TransportConfig {
            min_latency,
            max_latency,
            ..
        } = self.config;
        if !(min_latency.is_finite() && max_latency.is_finite()) {
            tracing::warn!("latency bounds {min_latency}..{max_latency} are not finite");
            return if min_latency.is_finite() {
                min_latency.max(0.0)
            } else {
                0.0
            };
        }
        if max_latency <= min_latency {
            return min_latency.max(0.0);
        }
        rng.random_range(min_latency..=max_latency)
    }
}

fn clamp_probability(rate: f64) -> f64 {
    if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
}
