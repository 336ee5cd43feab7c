//! Identifier types for simulated participants.
//!
//! Node IDs are plain strings (`node_0`, `node_1`, ...) wrapped in a newtype
//! so they cannot be confused with message tags or command payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A unique identifier for a simulated node.
///
/// # Invariants
///
/// - IDs are compared and ordered lexicographically, which gives the engine
///   a deterministic iteration order over its node registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create the conventional ID for the node at `index` in a cluster.
    ///
    /// # Examples
    ///
    /// ```
    /// use raftsim::types::NodeId;
    /// assert_eq!(NodeId::from_index(3).as_str(), "node_3");
    /// ```
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(format!("node_{index}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
