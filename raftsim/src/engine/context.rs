//! The view of the engine a node gets while one of its handlers runs.
//!
//! Nodes never hold a reference to the engine. Instead the engine lends a
//! [`NodeContext`] for the duration of each dispatch, through which the node
//! reads the clock and the cluster membership, sends messages, arms timers,
//! and records domain events.

use rand::rngs::StdRng;

use super::clock::VirtualClock;
use super::event::{EventKind, Timer};
use super::queue::EventQueue;
use super::record::{DomainEventKind, Recorder};
use crate::transport::{SendOutcome, Transport};
use crate::types::{Message, MessageBody, NodeId};

/// Engine state shared by every node, split from the node registry so that
/// one node can be borrowed mutably alongside it.
#[derive(Debug)]
pub(crate) struct World {
    pub(crate) clock: VirtualClock,
    pub(crate) queue: EventQueue,
    pub(crate) transport: Transport,
    pub(crate) rng: StdRng,
    pub(crate) recorder: Recorder,
    /// Registered node IDs, kept sorted.
    pub(crate) node_ids: Vec<NodeId>,
}

impl World {
    pub(crate) fn node_exists(&self, id: &NodeId) -> bool {
        self.node_ids.binary_search(id).is_ok()
    }
}

/// Capabilities the engine provides to the node it is dispatching to.
pub struct NodeContext<'a> {
    node: &'a NodeId,
    world: &'a mut World,
}

impl<'a> NodeContext<'a> {
    pub(crate) const fn new(node: &'a NodeId, world: &'a mut World) -> Self {
        Self { node, world }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.world.clock.now()
    }

    /// The ID of the node this context belongs to.
    #[must_use]
    pub const fn node_id(&self) -> &NodeId {
        self.node
    }

    /// Number of registered nodes, including this one.
    #[must_use]
    pub fn cluster_size(&self) -> usize {
        self.world.node_ids.len()
    }

    /// Every registered node except this one, in ID order.
    #[must_use]
    pub fn peers(&self) -> Vec<NodeId> {
        self.world
            .node_ids
            .iter()
            .filter(|id| *id != self.node)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn node_exists(&self, id: &NodeId) -> bool {
        self.world.node_exists(id)
    }

    /// The simulation's single random source.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.world.rng
    }

    /// Send `body` to `dst` after `delay` seconds.
    ///
    /// An unknown destination makes this a no-op with a warning. A negative
    /// delay is clamped to zero.
    pub fn send_message(&mut self, dst: &NodeId, body: MessageBody, delay: f64) {
        if !self.world.node_exists(dst) {
            tracing::warn!("node {} attempted to send to unknown node {dst}", self.node);
            self.world.recorder.stats_mut().validation_errors += 1;
            return;
        }
        let delay = self.clamp_delay(delay);
        let message = Message::new(self.node.clone(), dst.clone(), body);
        let message_type = message.message_type();
        let send_time = self.now() + delay;

        let World {
            transport,
            rng,
            queue,
            recorder,
            ..
        } = &mut *self.world;
        match transport.send(message, send_time, rng, queue) {
            Ok(SendOutcome::Scheduled { deliveries: 2 }) => {
                recorder.stats_mut().messages_duplicated += 1;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("node {} failed to send {message_type} to {dst}: {e}", self.node);
                recorder.stats_mut().validation_errors += 1;
            }
        }
    }

    /// Arm `timer` to fire after `delay` seconds.
    ///
    /// A negative delay is clamped to zero.
    pub fn schedule_timeout(&mut self, delay: f64, timer: Timer) {
        let delay = self.clamp_delay(delay);
        let at = self.now() + delay;
        let kind = EventKind::Timeout {
            node: self.node.clone(),
            timer,
        };
        match self.world.queue.schedule(at, kind) {
            Ok(_) => tracing::trace!("node {} armed timer at {at:.3}", self.node),
            Err(e) => {
                tracing::error!("node {} failed to schedule timeout: {e}", self.node);
                self.world.recorder.stats_mut().validation_errors += 1;
            }
        }
    }

    /// Record a domain event for observers.
    pub fn record(&mut self, kind: DomainEventKind, detail: impl Into<String>) {
        let now = self.now();
        self.world
            .recorder
            .record_event(now, kind, Some(self.node.clone()), detail);
    }

    fn clamp_delay(&self, delay: f64) -> f64 {
        if delay >= 0.0 {
            return delay;
        }
        tracing::warn!("node {}: negative delay {delay} corrected to 0", self.node);
        0.0
    }
}
