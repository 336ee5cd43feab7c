//! The same seed and the same calls give byte-identical runs.

use crate::config::SimulationConfig;
use crate::simulation::Simulation;

fn scripted_run(seed: u64) -> String {
    let config = SimulationConfig::new(seed)
        .with_node_count(5)
        .with_drop_rate(0.1)
        .with_duplicate_rate(0.05);
    let mut sim = Simulation::new(config).unwrap();

    sim.run(5.0).unwrap();
    let _ = sim.submit_to_leader("set x 1");
    sim.inject_failure("crash", Some(&"node_1".into()), Some(4.0))
        .unwrap();
    sim.run(12.0).unwrap();
    let _ = sim.submit_to_leader("set y 2");
    sim.inject_failure("partition", None, Some(3.0)).unwrap();
    sim.run(20.0).unwrap();

    serde_json::to_string(&sim.snapshot()).unwrap()
}

#[test]
fn test_same_seed_same_snapshot() {
    let first = scripted_run(1234);
    let second = scripted_run(1234);
    assert_eq!(first, second);
}

#[test]
fn test_same_seed_same_recorded_messages() {
    let run = |seed| {
        let mut sim = Simulation::new(SimulationConfig::new(seed)).unwrap();
        sim.run(8.0).unwrap();
        sim.engine().recorder().messages().to_vec()
    };
    let a = run(99);
    assert!(!a.is_empty());
    assert_eq!(a, run(99));
}
