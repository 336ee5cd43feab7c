//! Invariant checking over whole simulation runs.
//!
//! The checker observes a sequence of cluster snapshots (typically one per
//! processed event) and records every violation of the RAFT safety
//! properties it can see from outside the nodes.

use std::collections::BTreeMap;

use super::simulator::ClusterSnapshot;
use crate::raft::{RaftNodeSnapshot, Role};
use crate::types::{LogEntry, NodeId};

/// An invariant violation detected during simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantViolation {
    /// Description of the violation.
    pub description: String,
    /// Virtual time of the snapshot it was detected in.
    pub time: f64,
    /// Additional context.
    pub context: String,
}

/// Per-node values that must never decrease.
#[derive(Debug, Clone, Copy, Default)]
struct Watermarks {
    term: u64,
    committed: usize,
    applied: usize,
}

/// Checker for RAFT safety invariants.
#[derive(Debug, Default)]
pub struct InvariantChecker {
    violations: Vec<InvariantViolation>,
    observations: usize,
    /// Leader seen for each term.
    leaders: BTreeMap<u64, NodeId>,
    watermarks: BTreeMap<NodeId, Watermarks>,
    /// Longest committed prefix seen on any node.
    committed: Vec<LogEntry>,
}

impl InvariantChecker {
    /// Create a new invariant checker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all violations.
    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    /// Check if any violations were detected.
    #[must_use]
    pub const fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Number of snapshots observed so far.
    #[must_use]
    pub const fn observations(&self) -> usize {
        self.observations
    }

    /// Run every check against one snapshot.
    pub fn observe(&mut self, snapshot: &ClusterSnapshot) {
        self.observations += 1;
        let time = snapshot.time;
        self.check_election_safety(&snapshot.nodes, time);
        for node in &snapshot.nodes {
            self.check_node_bounds(node, time);
            self.check_monotonic(node, time);
        }
        self.check_log_matching(&snapshot.nodes, time);
        self.check_committed_durability(&snapshot.nodes, time);
    }

    fn violation(&mut self, description: impl Into<String>, time: f64, context: String) {
        let violation = InvariantViolation {
            description: description.into(),
            time,
            context,
        };
        tracing::error!(
            "invariant violated at {time:.3}: {} ({})",
            violation.description,
            violation.context
        );
        self.violations.push(violation);
    }

    /// At most one leader per term, ever.
    fn check_election_safety(&mut self, nodes: &[RaftNodeSnapshot], time: f64) {
        for node in nodes.iter().filter(|n| n.role == Role::Leader) {
            match self.leaders.get(&node.current_term) {
                Some(existing) if existing != &node.id => {
                    let context = format!(
                        "term {}: {} and {}",
                        node.current_term, existing, node.id
                    );
                    self.violation("two leaders in one term", time, context);
                }
                Some(_) => {}
                None => {
                    self.leaders.insert(node.current_term, node.id.clone());
                }
            }
        }
    }

    /// `last_applied <= commit <= len(log)` and no entry from a future term.
    fn check_node_bounds(&mut self, node: &RaftNodeSnapshot, time: f64) {
        if node.committed_entries > node.log_length || node.log_length != node.log.len() {
            let context = format!(
                "{}: committed {} of {} entries",
                node.id, node.committed_entries, node.log_length
            );
            self.violation("commit beyond log end", time, context);
        }
        if node.applied_entries > node.committed_entries {
            let context = format!(
                "{}: applied {} > committed {}",
                node.id, node.applied_entries, node.committed_entries
            );
            self.violation("applied beyond commit", time, context);
        }
        if let Some(entry) = node.log.iter().find(|e| e.term > node.current_term) {
            let context = format!(
                "{}: entry {} has term {} > current term {}",
                node.id, entry.index, entry.term, node.current_term
            );
            self.violation("log entry from a future term", time, context);
        }
    }

    fn check_monotonic(&mut self, node: &RaftNodeSnapshot, time: f64) {
        let previous = self
            .watermarks
            .get(&node.id)
            .copied()
            .unwrap_or_default();
        let current = Watermarks {
            term: node.current_term,
            committed: node.committed_entries,
            applied: node.applied_entries,
        };
        for (name, before, after) in [
            ("term", previous.term, current.term),
            ("commit", previous.committed as u64, current.committed as u64),
            ("applied", previous.applied as u64, current.applied as u64),
        ] {
            if after < before {
                let context = format!("{}: {name} went from {before} to {after}", node.id);
                self.violation(format!("{name} decreased"), time, context);
            }
        }
        self.watermarks.insert(node.id.clone(), current);
    }

    /// Committed prefixes of any two nodes agree.
    fn check_log_matching(&mut self, nodes: &[RaftNodeSnapshot], time: f64) {
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                let shared = a
                    .committed_entries
                    .min(b.committed_entries)
                    .min(a.log.len())
                    .min(b.log.len());
                if let Some(index) = (0..shared).find(|&k| !same_entry(&a.log[k], &b.log[k])) {
                    let context = format!("{} and {} differ at index {index}", a.id, b.id);
                    self.violation("committed logs diverge", time, context);
                }
            }
        }
    }

    /// Once committed, an entry never changes on any node.
    fn check_committed_durability(&mut self, nodes: &[RaftNodeSnapshot], time: f64) {
        for node in nodes {
            let prefix = &node.log[..node.committed_entries.min(node.log.len())];
            let shared = prefix.len().min(self.committed.len());
            if let Some(index) = (0..shared).find(|&k| !same_entry(&prefix[k], &self.committed[k])) {
                let context = format!("{} at index {index}", node.id);
                self.violation("committed entry changed", time, context);
                continue;
            }
            if prefix.len() > self.committed.len() {
                self.committed = prefix.to_vec();
            }
        }
    }
}

fn same_entry(a: &LogEntry, b: &LogEntry) -> bool {
    a.term == b.term && a.command == b.command
}
