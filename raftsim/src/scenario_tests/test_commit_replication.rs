//! A leader's commands reach and commit on every follower.

use crate::engine::DomainEventKind;
use crate::scenario_tests::helpers::*;
use crate::simulation::InvariantChecker;

#[test]
fn test_three_commands_commit_everywhere() {
    let mut sim = lossless(42, 5);
    let mut checker = InvariantChecker::new();
    let leader = wait_for_leader(&mut sim, 5.0, &mut checker).unwrap();

    for i in 0..3 {
        assert!(sim.submit_command(&leader, format!("cmd{i}")).unwrap());
    }
    // Leader commits after one round trip; followers learn it from the next
    // heartbeat, which leaves at most one interval after that commit.
    let config = sim.config();
    let until = sim.now() + config.heartbeat_interval + 3.0 * config.max_latency;
    run_checked(&mut sim, until, &mut checker);

    assert_no_violations(&checker);
    for node in sim.nodes() {
        assert_eq!(commands(node), vec!["cmd0", "cmd1", "cmd2"]);
        assert_eq!(node.commit_index(), 2);
        assert_eq!(node.committed_entries(), 3);
        assert_eq!(node.last_applied(), 2);
    }
}

#[test]
fn test_command_to_follower_is_rejected() {
    let mut sim = lossless(42, 5);
    let mut checker = InvariantChecker::new();
    let leader = wait_for_leader(&mut sim, 5.0, &mut checker).unwrap();

    let follower = sim
        .engine()
        .node_ids()
        .iter()
        .find(|id| **id != leader)
        .cloned()
        .unwrap();
    assert!(!sim.submit_command(&follower, "nope").unwrap());

    let until = sim.now() + 1.0;
    run_checked(&mut sim, until, &mut checker);
    assert!(sim.nodes().all(|n| n.log().is_empty()));
}

#[test]
fn test_submissions_are_recorded() {
    let mut sim = lossless(7, 3);
    let mut checker = InvariantChecker::new();
    let leader = wait_for_leader(&mut sim, 5.0, &mut checker).unwrap();
    assert!(sim.submit_command(&leader, "x").unwrap());
    let until = sim.now() + 1.0;
    run_checked(&mut sim, until, &mut checker);

    let kinds: Vec<DomainEventKind> = sim
        .engine()
        .recorder()
        .events()
        .iter()
        .map(|e| e.kind)
        .collect();
    assert!(kinds.contains(&DomainEventKind::BecameLeader));
    assert!(kinds.contains(&DomainEventKind::CommandSubmitted));
    assert!(kinds.contains(&DomainEventKind::EntriesCommitted));
}
