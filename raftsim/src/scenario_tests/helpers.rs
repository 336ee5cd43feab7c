//! Common helpers for scenario tests.

use crate::config::SimulationConfig;
use crate::node::Node;
use crate::raft::RaftNode;
use crate::simulation::{InvariantChecker, Simulation};
use crate::types::NodeId;

/// Keeps per-step snapshots small.
pub const RECORD_CAPACITY: usize = 64;

/// A lossless cluster of `nodes` nodes.
#[must_use]
pub fn lossless(seed: u64, nodes: usize) -> Simulation {
    let config = SimulationConfig::new(seed)
        .with_node_count(nodes)
        .with_drop_rate(0.0)
        .with_record_capacity(RECORD_CAPACITY);
    Simulation::new(config).unwrap()
}

/// Step through every event up to `until`, checking invariants after each.
pub fn run_checked(sim: &mut Simulation, until: f64, checker: &mut InvariantChecker) {
    while sim
        .engine()
        .next_event_time()
        .is_some_and(|t| t <= until)
    {
        assert!(sim.step().unwrap());
        checker.observe(&sim.snapshot());
    }
}

/// Run in small slices until an alive leader exists or `deadline` passes.
pub fn wait_for_leader(
    sim: &mut Simulation,
    deadline: f64,
    checker: &mut InvariantChecker,
) -> Option<NodeId> {
    let mut until = sim.now();
    while until < deadline {
        until = (until + 0.05).min(deadline);
        run_checked(sim, until, checker);
        if let Some(leader) = sim.leader() {
            return Some(leader.id().clone());
        }
    }
    None
}

/// Commands in `node`'s log, in order.
#[must_use]
pub fn commands(node: &RaftNode) -> Vec<String> {
    node.log().iter().map(|e| e.command.clone()).collect()
}

#[must_use]
pub fn node<'a>(sim: &'a Simulation, id: &NodeId) -> &'a RaftNode {
    sim.node(id).unwrap()
}

pub fn assert_no_violations(checker: &InvariantChecker) {
    assert!(
        !checker.has_violations(),
        "invariant violations: {:#?}",
        checker.violations()
    );
    assert!(checker.observations() > 0);
}
