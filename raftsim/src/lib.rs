// Life of a run:
// 1. Build a Simulation from a SimulationConfig (one engine, N RAFT nodes)
// 2. Every node arms its first election timeout
// 3. The engine pops events in (timestamp, sequence) order:
//     - message deliveries go to the destination's handler
//     - timeouts go to the owning node
//     - crash / recover / partition events change the world
//    and ticks every alive node at most once per tick interval
// 4. Observers read snapshots; the InvariantChecker verifies safety
//
// System components:
//  - Discrete-event engine and message transport
//  - RAFT state machine
//  - Failure injector
//  - Background worker and HTTP control plane (binary)
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod api;
pub mod config;
pub mod control;
pub mod engine;
pub mod failure;
pub mod node;
pub mod raft;
pub mod simulation;
pub mod transport;
pub mod types;

#[cfg(test)]
mod scenario_tests;

pub use engine::{Engine, EngineConfig, NodeError, SimulationError};
pub use node::Node;
pub use simulation::Simulation;
