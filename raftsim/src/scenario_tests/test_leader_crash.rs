//! Crashing the leader elects a successor; the old leader rejoins.

use crate::node::Node;
use crate::raft::Role;
use crate::scenario_tests::helpers::*;
use crate::simulation::InvariantChecker;

#[test]
fn test_new_leader_after_crash_and_old_leader_rejoins() {
    let mut sim = lossless(42, 5);
    let mut checker = InvariantChecker::new();
    let old_leader = wait_for_leader(&mut sim, 5.0, &mut checker).unwrap();
    let old_term = node(&sim, &old_leader).current_term();

    assert!(sim.submit_command(&old_leader, "before").unwrap());
    let until = sim.now() + 1.0;
    run_checked(&mut sim, until, &mut checker);

    let crash_time = sim.now();
    assert!(
        sim.inject_failure("crash", Some(&old_leader), Some(15.0))
            .unwrap()
    );
    let until = crash_time + 0.001;
    run_checked(&mut sim, until, &mut checker);
    assert!(!node(&sim, &old_leader).is_alive());

    // Seed 42 elects the successor well inside one election timeout plus
    // delivery; other seeds can need a second round of split votes.
    let bound = sim.config().election_timeout_max + sim.config().max_latency;
    let new_leader = wait_for_leader(&mut sim, crash_time + bound, &mut checker)
        .expect("no successor within one election timeout of the crash");
    let elapsed = sim.now() - crash_time;
    assert!(
        elapsed <= bound,
        "successor elected {elapsed:.3}s after the crash, bound {bound:.3}s"
    );
    assert_ne!(new_leader, old_leader);
    assert!(node(&sim, &new_leader).current_term() > old_term);

    assert!(sim.submit_command(&new_leader, "after").unwrap());
    run_checked(&mut sim, crash_time + 18.0, &mut checker);

    assert_no_violations(&checker);
    let rejoined = node(&sim, &old_leader);
    assert!(rejoined.is_alive());
    assert_eq!(rejoined.role(), Role::Follower);
    let leader = sim.leader().unwrap();
    assert_eq!(rejoined.current_term(), leader.current_term());
    assert_eq!(commands(rejoined), vec!["before", "after"]);
    assert_eq!(rejoined.committed_entries(), 2);
}

#[test]
fn test_crashed_node_ignores_traffic() {
    let mut sim = lossless(3, 3);
    let mut checker = InvariantChecker::new();
    let leader = wait_for_leader(&mut sim, 5.0, &mut checker).unwrap();
    let follower = sim
        .engine()
        .node_ids()
        .iter()
        .find(|id| **id != leader)
        .cloned()
        .unwrap();

    sim.inject_failure("crash", Some(&follower), None).unwrap();
    let term_at_crash = node(&sim, &follower).current_term();
    assert!(sim.submit_command(&leader, "x").unwrap());
    let until = sim.now() + 5.0;
    run_checked(&mut sim, until, &mut checker);

    let crashed = node(&sim, &follower);
    assert!(!crashed.is_alive());
    assert!(crashed.log().is_empty());
    assert_eq!(crashed.current_term(), term_at_crash);
    assert!(sim.engine().stats().messages_undeliverable > 0);
    // Two of three nodes still form a majority.
    assert_eq!(node(&sim, &leader).committed_entries(), 1);
}
