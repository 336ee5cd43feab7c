//! Five lossless nodes elect exactly one leader and commit nothing.

use crate::node::Node;
use crate::raft::Role;
use crate::scenario_tests::helpers::*;
use crate::simulation::InvariantChecker;

#[test]
fn test_exactly_one_leader_after_ten_seconds() {
    let mut sim = lossless(42, 5);
    let mut checker = InvariantChecker::new();

    run_checked(&mut sim, 10.0, &mut checker);

    assert_no_violations(&checker);
    let leaders = sim.leaders();
    assert_eq!(leaders.len(), 1, "expected one leader");
    let leader = leaders[0].id().clone();
    let term = leaders[0].current_term();

    for node in sim.nodes() {
        assert!(node.is_alive());
        assert_eq!(node.commit_index(), 0);
        assert_eq!(node.committed_entries(), 0);
        assert!(node.log().is_empty());
        if node.id() != &leader {
            assert_eq!(node.role(), Role::Follower);
            assert_eq!(node.current_term(), term);
        }
    }
}

#[test]
fn test_followers_know_the_leader() {
    let mut sim = lossless(42, 5);
    let mut checker = InvariantChecker::new();
    run_checked(&mut sim, 10.0, &mut checker);

    let snapshot = sim.snapshot();
    let leader = sim.leader().unwrap().id().clone();
    assert!(
        snapshot
            .nodes
            .iter()
            .all(|n| n.leader_id.as_ref() == Some(&leader))
    );
    assert!(snapshot.nodes.iter().all(|n| n.votes_received.is_none()));
}
