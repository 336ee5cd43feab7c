//! Pausing, resuming, and stepping never change what a run computes.

use crate::config::SimulationConfig;
use crate::engine::StopReason;
use crate::simulation::Simulation;

fn sim(seed: u64) -> Simulation {
    Simulation::new(SimulationConfig::new(seed).with_node_count(5)).unwrap()
}

fn state(sim: &Simulation) -> String {
    serde_json::to_string(&sim.snapshot().nodes).unwrap()
}

#[test]
fn test_split_run_matches_direct_run() {
    let mut split = sim(42);
    let first = split.run(4.0).unwrap();
    assert_eq!(first.stop_reason, StopReason::ReachedMaxTime);
    let second = split.resume(10.0).unwrap();
    assert_eq!(second.stop_reason, StopReason::ReachedMaxTime);

    let mut direct = sim(42);
    let report = direct.run(10.0).unwrap();

    assert_eq!(
        first.events_processed + second.events_processed,
        report.events_processed
    );
    assert_eq!(state(&split), state(&direct));
    assert_eq!(split.engine().stats(), direct.engine().stats());
}

#[test]
fn test_pause_before_run_stops_immediately() {
    let mut paused = sim(42);
    paused.run(3.0).unwrap();
    let before = state(&paused);

    paused.pause();
    let report = paused.run(10.0).unwrap();
    assert_eq!(report.stop_reason, StopReason::Paused);
    assert_eq!(report.events_processed, 0);
    assert!(paused.snapshot().paused);
    assert_eq!(state(&paused), before);

    let report = paused.resume(10.0).unwrap();
    assert_eq!(report.stop_reason, StopReason::ReachedMaxTime);
    assert!(!paused.snapshot().paused);

    let mut direct = sim(42);
    direct.run(10.0).unwrap();
    assert_eq!(state(&paused), state(&direct));
}

#[test]
fn test_pause_handle_from_another_thread() {
    let mut sim = sim(8);
    let handle = sim.pause_handle();
    std::thread::spawn(move || handle.pause()).join().unwrap();
    assert_eq!(sim.run(10.0).unwrap().stop_reason, StopReason::Paused);
}

#[test]
fn test_stepping_matches_running() {
    let mut stepped = sim(3);
    while stepped
        .engine()
        .next_event_time()
        .is_some_and(|t| t <= 6.0)
    {
        assert!(stepped.step().unwrap());
    }

    let mut ran = sim(3);
    ran.run(6.0).unwrap();

    assert_eq!(state(&stepped), state(&ran));
    assert_eq!(stepped.now(), ran.now());
}
