//! End-to-end scenarios over a whole RAFT cluster.
//!
//! Each test file covers one scenario with a fixed seed, so every run is
//! reproducible. Long runs are stepped one event at a time and checked by
//! an [`InvariantChecker`](crate::simulation::InvariantChecker).

#![cfg(test)]

mod helpers;

mod test_commit_replication;
mod test_determinism;
mod test_election_safety;
mod test_leader_crash;
mod test_partition;
mod test_pause_resume;
mod test_single_leader;
mod test_total_message_loss;
