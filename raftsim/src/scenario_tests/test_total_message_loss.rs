//! With every message dropped, no node can ever win an election.

use crate::config::SimulationConfig;
use crate::raft::Role;
use crate::simulation::Simulation;

#[test]
fn test_no_leader_when_all_messages_drop() {
    let config = SimulationConfig::new(42)
        .with_node_count(5)
        .with_drop_rate(1.0);
    let mut sim = Simulation::new(config).unwrap();

    while sim
        .engine()
        .next_event_time()
        .is_some_and(|t| t <= 10.0)
    {
        sim.step().unwrap();
        assert!(
            sim.nodes().all(|n| n.role() != Role::Leader),
            "leader elected at {:.3}",
            sim.now()
        );
    }

    let stats = sim.engine().stats();
    assert_eq!(stats.messages_delivered, 0);
    assert!(stats.messages_sent > 0);
    assert_eq!(stats.messages_dropped, stats.messages_sent);
    // Elections keep being attempted.
    assert!(sim.nodes().all(|n| n.current_term() > 1));
}
