//! The `Simulation` object: one engine, one RAFT cluster, one injector.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::{ConfigError, SimulationConfig};
use crate::engine::{Engine, EngineConfig, EngineSnapshot, PauseHandle, RunReport, SimulationError};
use crate::failure::{ActiveFailure, FailureConfig, FailureInjector, FailureKind};
use crate::node::Node;
use crate::raft::{RaftNode, RaftNodeSnapshot, Role};
use crate::types::NodeId;

/// Engine snapshot of a RAFT cluster.
pub type ClusterSnapshot = EngineSnapshot<RaftNodeSnapshot>;

/// Counts derived from a [`ClusterSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub nodes: usize,
    pub alive: usize,
    pub crashed: usize,
    pub followers: usize,
    pub candidates: usize,
    pub leaders: usize,
    /// Alive leader with the highest term, if any.
    pub leader: Option<NodeId>,
    pub highest_term: u64,
}

impl ClusterSummary {
    #[must_use]
    pub fn from_snapshot(snapshot: &ClusterSnapshot) -> Self {
        let mut summary = Self {
            nodes: snapshot.nodes.len(),
            ..Self::default()
        };
        let mut leader_term = None;
        for node in &snapshot.nodes {
            summary.highest_term = summary.highest_term.max(node.current_term);
            if !node.alive {
                summary.crashed += 1;
                continue;
            }
            summary.alive += 1;
            match node.role {
                Role::Follower => summary.followers += 1,
                Role::Candidate => summary.candidates += 1,
                Role::Leader => {
                    summary.leaders += 1;
                    if leader_term < Some(node.current_term) {
                        leader_term = Some(node.current_term);
                        summary.leader = Some(node.id.clone());
                    }
                }
            }
        }
        summary
    }
}

/// A RAFT cluster running on a discrete-event engine.
///
/// Explicitly constructed and owned by its caller; there is no process-wide
/// simulation state.
pub struct Simulation {
    config: SimulationConfig,
    engine: Engine<RaftNode>,
    injector: FailureInjector,
}

impl Simulation {
    /// Build the engine and register `node_count` RAFT nodes named
    /// `node_0`, `node_1`, ...; each arms its first election timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration does not validate.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let injector = FailureInjector::new(FailureConfig::default())?;
        let engine_config = EngineConfig {
            seed: config.random_seed,
            transport: config.transport(),
            tick_interval: config.tick_interval,
            record_capacity: config.record_capacity,
        };
        let mut engine = Engine::new(engine_config);
        let timing = config.timing();
        for i in 0..config.node_count {
            engine.register_node(RaftNode::new(NodeId::from_index(i), timing));
        }
        tracing::info!(
            "simulation created with {} nodes (seed {})",
            config.node_count,
            config.random_seed
        );
        engine.publish();

        Ok(Self {
            config,
            engine,
            injector,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub const fn engine(&self) -> &Engine<RaftNode> {
        &self.engine
    }

    pub const fn engine_mut(&mut self) -> &mut Engine<RaftNode> {
        &mut self.engine
    }

    #[must_use]
    pub const fn injector(&self) -> &FailureInjector {
        &self.injector
    }

    #[must_use]
    pub fn now(&self) -> f64 {
        self.engine.now()
    }

    /// Run until `max_time`, an empty queue, or a pause.
    pub fn run(&mut self, max_time: f64) -> Result<RunReport, SimulationError> {
        self.engine.run(max_time)
    }

    pub fn pause(&self) {
        self.engine.pause();
    }

    #[must_use]
    pub fn pause_handle(&self) -> PauseHandle {
        self.engine.pause_handle()
    }

    pub fn resume(&mut self, max_time: f64) -> Result<RunReport, SimulationError> {
        self.engine.resume(max_time)
    }

    /// Process exactly one event.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        self.engine.step()
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&RaftNode> {
        self.engine.node(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RaftNode> {
        self.engine.nodes()
    }

    /// Alive leaders, in ID order.
    #[must_use]
    pub fn leaders(&self) -> Vec<&RaftNode> {
        self.nodes().filter(|n| n.is_leader()).collect()
    }

    /// The alive leader with the highest term.
    #[must_use]
    pub fn leader(&self) -> Option<&RaftNode> {
        self.nodes()
            .filter(|n| n.is_leader())
            .max_by_key(|n| n.current_term())
    }

    /// Submit `command` through a specific node.
    ///
    /// Returns `Ok(false)` if that node is not an alive leader.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError::UnknownNode` if `node` is not registered.
    pub fn submit_command(
        &mut self,
        node: &NodeId,
        command: impl Into<String>,
    ) -> Result<bool, SimulationError> {
        let command = command.into();
        let accepted = self
            .engine
            .with_node(node, |raft, ctx| raft.submit_command(command, ctx))
            .ok_or_else(|| SimulationError::UnknownNode(node.clone()))?;
        self.engine.publish();
        Ok(accepted)
    }

    /// Submit `command` to the current leader. Returns the leader's ID, or
    /// `None` if there is no leader.
    pub fn submit_to_leader(&mut self, command: impl Into<String>) -> Option<NodeId> {
        let leader = self.leader()?.id().clone();
        match self.submit_command(&leader, command) {
            Ok(true) => Some(leader),
            Ok(false) | Err(_) => None,
        }
    }

    /// Inject a failure by kind name.
    ///
    /// - `crash` / `recover` need `node`; `crash` recovers after
    ///   `recovery_time` if given.
    /// - `partition` isolates `node` (or, without one, splits the cluster
    ///   in half) and heals after `recovery_time` if given.
    /// - `heal` removes any partition.
    ///
    /// Unsupported kinds and missing node IDs are logged and ignored
    /// (`Ok(false)`).
    ///
    /// # Errors
    ///
    /// Returns `SimulationError` if the injector rejects the request, e.g.
    /// for an unknown node.
    pub fn inject_failure(
        &mut self,
        kind: &str,
        node: Option<&NodeId>,
        recovery_time: Option<f64>,
    ) -> Result<bool, SimulationError> {
        let kind = match kind.parse::<FailureKind>() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!("ignoring failure injection: {e}");
                self.engine.note_validation_error();
                return Ok(false);
            }
        };
        match (kind, node) {
            (FailureKind::Crash, Some(node)) => {
                self.injector
                    .inject_node_crash(&mut self.engine, node, recovery_time)?;
            }
            (FailureKind::Recover, Some(node)) => {
                self.injector.inject_node_recovery(&mut self.engine, node)?;
            }
            (FailureKind::Crash | FailureKind::Recover, None) => {
                tracing::warn!("ignoring {kind} injection without a node id");
                self.engine.note_validation_error();
                return Ok(false);
            }
            (FailureKind::Partition, node) => {
                let groups = match node {
                    Some(node) => vec![vec![node.clone()]],
                    None => {
                        let ids = self.engine.node_ids();
                        vec![ids[..ids.len() / 2].to_vec()]
                    }
                };
                self.injector
                    .inject_network_partition(&mut self.engine, groups, recovery_time)?;
            }
            (FailureKind::Heal, _) => self.injector.heal_partition(&mut self.engine)?,
        }
        Ok(true)
    }

    /// Split the network into explicit groups.
    pub fn inject_partition(
        &mut self,
        groups: Vec<Vec<NodeId>>,
        duration: Option<f64>,
    ) -> Result<(), SimulationError> {
        self.injector
            .inject_network_partition(&mut self.engine, groups, duration)
    }

    pub fn set_drop_rate(&mut self, rate: f64) {
        FailureInjector::set_drop_rate(&mut self.engine, rate);
    }

    pub fn set_duplicate_rate(&mut self, rate: f64) {
        FailureInjector::set_duplicate_rate(&mut self.engine, rate);
    }

    #[must_use]
    pub fn active_failures(&self) -> Vec<ActiveFailure> {
        self.injector.active_failures(self.now())
    }

    #[must_use]
    pub fn snapshot(&self) -> ClusterSnapshot {
        self.engine.snapshot()
    }

    /// Receiver for snapshots published while the simulation runs.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<ClusterSnapshot>> {
        self.engine.subscribe()
    }
}
