//! Randomised fault schedules never break RAFT's safety properties.

use crate::config::SimulationConfig;
use crate::scenario_tests::helpers::*;
use crate::simulation::{InvariantChecker, Simulation};

fn chaotic_run(seed: u64) -> InvariantChecker {
    let config = SimulationConfig::new(seed)
        .with_node_count(5)
        .with_drop_rate(0.1)
        .with_duplicate_rate(0.02)
        .with_record_capacity(RECORD_CAPACITY);
    let mut sim = Simulation::new(config).unwrap();
    let mut checker = InvariantChecker::new();
    let ids = sim.engine().node_ids().to_vec();

    let mut slice = 0;
    let mut until = 0.0;
    while until < 30.0 {
        until += 2.0;
        run_checked(&mut sim, until, &mut checker);

        let _ = sim.submit_to_leader(format!("cmd{slice}"));
        if slice % 3 == 1 {
            let victim = &ids[(slice + usize::try_from(seed).unwrap()) % ids.len()];
            sim.inject_failure("crash", Some(victim), Some(3.0)).unwrap();
        }
        if slice == 7 {
            sim.inject_failure("partition", None, Some(4.0)).unwrap();
        }
        slice += 1;
    }
    checker
}

#[test]
fn test_safety_holds_across_seeds() {
    for seed in 1..=5 {
        let checker = chaotic_run(seed);
        assert!(
            !checker.has_violations(),
            "seed {seed}: {:#?}",
            checker.violations()
        );
        assert!(checker.observations() > 100);
    }
}

#[test]
fn test_cluster_makes_progress_despite_faults() {
    let config = SimulationConfig::new(11)
        .with_node_count(5)
        .with_drop_rate(0.1)
        .with_record_capacity(RECORD_CAPACITY);
    let mut sim = Simulation::new(config).unwrap();
    let mut checker = InvariantChecker::new();
    for i in 0..10 {
        let until = f64::from(i + 1) * 3.0;
        run_checked(&mut sim, until, &mut checker);
        let _ = sim.submit_to_leader(format!("write{i}"));
    }
    run_checked(&mut sim, 40.0, &mut checker);

    assert_no_violations(&checker);
    let best = sim.nodes().map(|n| n.committed_entries()).max().unwrap();
    assert!(best > 0, "nothing committed");
}
