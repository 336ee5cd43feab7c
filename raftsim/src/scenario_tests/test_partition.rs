//! An isolated leader's uncommitted write is discarded once the partition
//! heals and the majority side's leader takes over.

use crate::node::Node;
use crate::raft::Role;
use crate::scenario_tests::helpers::*;
use crate::simulation::{InvariantChecker, Simulation};
use crate::types::NodeId;

/// Run until an alive leader other than `old` exists.
fn wait_for_new_leader(
    sim: &mut Simulation,
    old: &NodeId,
    deadline: f64,
    checker: &mut InvariantChecker,
) -> NodeId {
    let mut until = sim.now();
    while until < deadline {
        until = (until + 0.05).min(deadline);
        run_checked(sim, until, checker);
        if let Some(leader) = sim.leaders().into_iter().find(|n| n.id() != old) {
            return leader.id().clone();
        }
    }
    panic!("no new leader by {deadline}");
}

#[test]
fn test_minority_leader_write_is_truncated_after_heal() {
    let mut sim = lossless(42, 5);
    let mut checker = InvariantChecker::new();
    let old_leader = wait_for_leader(&mut sim, 5.0, &mut checker).unwrap();

    sim.inject_partition(vec![vec![old_leader.clone()]], None)
        .unwrap();
    let until = sim.now() + 0.001;
    run_checked(&mut sim, until, &mut checker);
    assert!(sim.snapshot().partition.is_some());

    // Still believes it leads; the write can never commit.
    assert!(sim.submit_command(&old_leader, "lost").unwrap());

    let start = sim.now();
    let new_leader = wait_for_new_leader(&mut sim, &old_leader, start + 10.0, &mut checker);
    assert!(node(&sim, &new_leader).current_term() > node(&sim, &old_leader).current_term());
    assert!(sim.submit_command(&new_leader, "kept").unwrap());
    let until = sim.now() + 1.0;
    run_checked(&mut sim, until, &mut checker);

    assert_eq!(commands(node(&sim, &old_leader)), vec!["lost"]);
    assert_eq!(node(&sim, &old_leader).committed_entries(), 0);
    assert_eq!(node(&sim, &new_leader).committed_entries(), 1);

    assert!(sim.inject_failure("heal", None, None).unwrap());
    let until = sim.now() + 3.0;
    run_checked(&mut sim, until, &mut checker);

    assert_no_violations(&checker);
    assert!(sim.snapshot().partition.is_none());
    let rejoined = node(&sim, &old_leader);
    assert_eq!(rejoined.role(), Role::Follower);
    for raft in sim.nodes() {
        assert_eq!(commands(raft), vec!["kept"], "log of {}", raft.id());
        assert_eq!(raft.committed_entries(), 1);
    }
}

#[test]
fn test_partitioned_messages_are_dropped() {
    let mut sim = lossless(5, 3);
    let mut checker = InvariantChecker::new();
    sim.inject_partition(
        vec![
            vec![NodeId::from("node_0")],
            vec![NodeId::from("node_1")],
            vec![NodeId::from("node_2")],
        ],
        Some(5.0),
    )
    .unwrap();

    run_checked(&mut sim, 4.9, &mut checker);
    assert!(sim.leaders().is_empty());
    let stats = *sim.engine().stats();
    assert_eq!(stats.messages_delivered, 0);
    assert!(stats.messages_dropped > 0);

    // Healed at 5.0; a leader follows.
    assert!(wait_for_leader(&mut sim, 15.0, &mut checker).is_some());
    assert_no_violations(&checker);
}
