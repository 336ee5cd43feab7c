//! RAFT cluster simulation.
//!
//! This module ties the kernel, the RAFT nodes, and the failure injector
//! together into one explicitly owned [`Simulation`], and provides an
//! [`InvariantChecker`] that verifies RAFT safety over whole runs.
//!
//! # Design Principles
//!
//! 1. All randomness is seeded for reproducibility
//! 2. Time is virtual, advanced only by the event queue
//! 3. Faults are injected as scheduled events
//! 4. Given the same seed and the same calls, execution is identical
//!
//! # Usage
//!
//! ```ignore
//! use raftsim::config::SimulationConfig;
//! use raftsim::simulation::{InvariantChecker, Simulation};
//!
//! let config = SimulationConfig::new(12345).with_node_count(5);
//! let mut sim = Simulation::new(config)?;
//! let mut checker = InvariantChecker::new();
//!
//! while sim.now() < 10.0 && sim.step()? {
//!     checker.observe(&sim.snapshot());
//! }
//! assert!(!checker.has_violations());
//! ```

mod invariants;
mod simulator;

pub use invariants::{InvariantChecker, InvariantViolation};
pub use simulator::{ClusterSnapshot, ClusterSummary, Simulation};
