//! The contract every simulated participant implements.
//!
//! Concrete nodes embed a [`NodeCore`] (identity and liveness) and implement
//! the protocol hooks of [`Node`]. Lifecycle handling (`crash`, `recover`,
//! `is_alive`) is provided by the trait on top of the core, so every node
//! type crashes and recovers the same way.
//!
//! All handlers run to completion on the engine's single thread and return a
//! [`NodeError`] instead of panicking on bad input. The engine isolates each
//! dispatch, so a failing handler never stops the run.

use serde::Serialize;

use crate::engine::{DomainEventKind, NodeContext, NodeError, Timer};
use crate::types::{Message, NodeId};

/// Identity and liveness shared by all node types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCore {
    id: NodeId,
    alive: bool,
}

impl NodeCore {
    /// A new, alive node.
    #[must_use]
    pub const fn new(id: NodeId) -> Self {
        Self { id, alive: true }
    }

    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    /// Flip liveness. Returns whether the state actually changed.
    const fn set_alive(&mut self, alive: bool) -> bool {
        let changed = self.alive != alive;
        self.alive = alive;
        changed
    }
}

pub trait Node {
    /// Read-only view published to observers.
    type Snapshot: Clone + Serialize + Send + Sync + 'static;

    fn core(&self) -> &NodeCore;

    fn core_mut(&mut self) -> &mut NodeCore;

    /// Called once when the node is registered with an engine.
    fn start(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Handle a delivered message. Only called while the node is alive.
    fn receive_message(&mut self, message: Message, ctx: &mut NodeContext<'_>)
    -> Result<(), NodeError>;

    /// Periodic time advance. Only called while the node is alive.
    fn tick(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError>;

    /// Handle a custom timer. The default only logs it.
    fn handle_timeout(&mut self, timer: Timer, _ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        tracing::debug!("node {}: unhandled timer {timer:?}", self.id());
        Ok(())
    }

    fn handle_election_timeout(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        self.handle_timeout(Timer::Election, ctx)
    }

    fn handle_heartbeat_timeout(
        &mut self,
        term: u64,
        ctx: &mut NodeContext<'_>,
    ) -> Result<(), NodeError> {
        self.handle_timeout(Timer::Heartbeat { term }, ctx)
    }

    /// Hook run after the node has been marked crashed.
    fn on_crash(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// Hook run after the node has been marked alive again.
    fn on_recover(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    fn snapshot(&self) -> Self::Snapshot;

    fn id(&self) -> &NodeId {
        self.core().id()
    }

    fn is_alive(&self) -> bool {
        self.core().is_alive()
    }

    /// Mark the node crashed. Idempotent: returns `false` if it already was.
    fn crash(&mut self, ctx: &mut NodeContext<'_>) -> bool {
        if !self.core_mut().set_alive(false) {
            return false;
        }
        tracing::warn!("node {} crashed", self.id());
        ctx.record(DomainEventKind::NodeCrash, "node crashed");
        self.on_crash(ctx);
        true
    }

    /// Bring the node back. Idempotent: returns `Ok(false)` if it was alive.
    fn recover(&mut self, ctx: &mut NodeContext<'_>) -> Result<bool, NodeError> {
        if !self.core_mut().set_alive(true) {
            return Ok(false);
        }
        tracing::info!("node {} recovered from crash", self.id());
        ctx.record(DomainEventKind::NodeRecover, "node recovered");
        self.on_recover(ctx)?;
        Ok(true)
    }
}
