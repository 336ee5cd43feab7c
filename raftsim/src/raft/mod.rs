//! RAFT consensus on top of the simulation kernel.
//!
//! [`RaftNode`] implements leader election, heartbeats, and log replication
//! as a [`Node`](crate::node::Node). Safety rests on two rules:
//!
//! 1. A candidate only wins with a strict majority of votes, and a vote is
//!    only granted to a candidate whose log is at least as up to date.
//! 2. A leader only commits entries of its own term by counting replicas;
//!    earlier entries are committed indirectly.

mod node;
mod role;
mod timing;

pub use node::{RaftNode, RaftNodeSnapshot, majority};
pub use role::Role;
pub use timing::RaftTiming;
