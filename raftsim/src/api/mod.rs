//! HTTP control plane for a running simulation.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /raft/status` - Latest status: summary, active failures and the
//!   full cluster snapshot
//! - `POST /raft/start` - Start a fresh run; the body is an optional
//!   [`SimulationConfig`](crate::config::SimulationConfig) in JSON, any
//!   missing field takes its default
//! - `POST /raft/stop` - Stop advancing virtual time
//! - `POST /raft/chaos` - Inject a failure: `{"kind", "node_id"?, "recovery_time"?}`
//! - `POST /raft/command` - Submit `{"command"}` to the current leader
//!
//! Handlers never touch the simulation directly; they go through a
//! [`SimulationHandle`](crate::control::SimulationHandle).

mod handlers;
mod routes;
mod types;

pub use routes::create_router;
pub use types::{
    ActionResponse, ChaosBody, CommandBody, CommandResponse, ErrorResponse, HealthResponse,
};
