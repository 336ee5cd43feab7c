//! Discrete-event simulation kernel.
//!
//! - [`VirtualClock`]: simulated time, advanced only by the engine
//! - [`EventQueue`]: min-queue ordered by `(timestamp, sequence)`
//! - [`Engine`]: owns clock, queue, transport, RNG, and nodes; dispatches
//! - [`NodeContext`]: what a node may do while one of its handlers runs
//! - [`Recorder`]: bounded recent-message/event records and run counters
//!
//! Given the same seed and the same sequence of external calls, a run is
//! exactly reproducible.

mod clock;
mod context;
mod error;
mod event;
mod kernel;
mod queue;
mod record;

pub use clock::VirtualClock;
pub use context::NodeContext;
pub use error::{NodeError, SimulationError};
pub use event::{DropReason, Event, EventKind, Timer};
pub use kernel::{
    DEFAULT_TICK_INTERVAL, Engine, EngineConfig, EngineSnapshot, PauseHandle, RunReport,
    StopReason,
};
pub use queue::EventQueue;
pub use record::{
    BoundedLog, DEFAULT_RECORD_CAPACITY, DomainEvent, DomainEventKind, MessageOutcome,
    MessageRecord, Recorder, RunStats,
};
