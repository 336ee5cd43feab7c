//! Error types for the simulation kernel.
//!
//! Only [`SimulationError`] ever crosses the engine boundary. Problems raised
//! by node handlers ([`NodeError`]) are classified, counted, and logged by the
//! engine; they never abort a run.

use crate::types::NodeId;

/// Errors returned by engine, transport, and injector operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// An event was scheduled with a negative or non-finite timestamp.
    InvalidEvent { timestamp: f64 },
    /// A send was attempted at a negative or non-finite time.
    InvalidTimestamp { timestamp: f64 },
    /// The referenced node is not registered.
    UnknownNode(NodeId),
    /// The event queue violated its ordering invariant.
    QueueCorrupted(String),
}

impl std::fmt::Display for SimulationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEvent { timestamp } => {
                write!(f, "invalid event timestamp: {timestamp}")
            }
            Self::InvalidTimestamp { timestamp } => {
                write!(f, "invalid send timestamp: {timestamp}")
            }
            Self::UnknownNode(id) => write!(f, "unknown node: {id}"),
            Self::QueueCorrupted(message) => write!(f, "event queue corrupted: {message}"),
        }
    }
}

impl std::error::Error for SimulationError {}

/// Errors returned by node handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The message content is inconsistent (e.g. entry indices out of place).
    Malformed(String),
    /// The message or timer makes no sense for this node right now.
    Unexpected(String),
    /// The node's own state is inconsistent.
    Internal(String),
}

impl NodeError {
    /// Whether the error indicates a bug in the node rather than bad input.
    #[must_use]
    pub const fn is_logic_fault(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed input: {message}"),
            Self::Unexpected(message) => write!(f, "unexpected input: {message}"),
            Self::Internal(message) => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for NodeError {}
