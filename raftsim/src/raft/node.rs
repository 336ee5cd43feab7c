//! The RAFT state machine as a simulated node.
//!
//! # Indexing
//!
//! Log indices are 0-based. On the wire a position is an `Option<u64>`, with
//! `None` meaning "before the first entry". Internally the node tracks
//! lengths (`committed_len`, `applied_len`, per-peer `match_len`) so that an
//! empty commit and a single committed entry stay distinguishable; the
//! exposed `commit_index` / `last_applied` are the 0-based indices of the
//! last such entry, saturating at 0.
//!
//! # Timers
//!
//! The election timer is a deadline (`last contact + random timeout`). Only
//! one wake-up event is kept outstanding; when it fires early because the
//! deadline moved, it re-arms for the remainder. Ticks check the same
//! deadline. Heartbeat timers carry the term that armed them, so a stale one
//! is ignored after the node steps down.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::role::Role;
use super::timing::RaftTiming;
use crate::engine::{DomainEventKind, NodeContext, NodeError, Timer};
use crate::node::{Node, NodeCore};
use crate::types::{LogEntry, Message, MessageBody, NodeId};

/// Slack used when comparing the clock against the election deadline.
const DEADLINE_EPSILON: f64 = 1e-9;

/// Number of votes (or replicas) forming a strict majority of `cluster_size`.
#[must_use]
pub const fn majority(cluster_size: usize) -> usize {
    cluster_size / 2 + 1
}

/// Read-only view of a RAFT node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaftNodeSnapshot {
    pub id: NodeId,
    pub alive: bool,
    pub role: Role,
    pub current_term: u64,
    pub voted_for: Option<NodeId>,
    /// Leader this node last accepted AppendEntries from in its current term.
    pub leader_id: Option<NodeId>,
    pub log_length: usize,
    pub log: Vec<LogEntry>,
    /// 0-based index of the last committed entry (0 when nothing is committed).
    pub commit_index: u64,
    /// Number of committed entries.
    pub committed_entries: usize,
    pub last_applied: u64,
    /// Number of applied entries.
    pub applied_entries: usize,
    /// Only present while a candidate.
    pub votes_received: Option<Vec<NodeId>>,
    pub votes_needed: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RaftNode {
    core: NodeCore,
    timing: RaftTiming,

    // Persistent state.
    current_term: u64,
    voted_for: Option<NodeId>,
    log: Vec<LogEntry>,

    // Volatile state.
    committed_len: usize,
    applied_len: usize,
    role: Role,
    leader_id: Option<NodeId>,

    // Leader-only, reset on every election win.
    next_index: BTreeMap<NodeId, usize>,
    match_len: BTreeMap<NodeId, usize>,

    // Candidate-only.
    votes_received: BTreeSet<NodeId>,
    votes_needed: usize,

    election_deadline: f64,
    /// Fire time of the outstanding election wake-up, if any.
    election_timer_at: Option<f64>,
}

impl RaftNode {
    #[must_use]
    pub const fn new(id: NodeId, timing: RaftTiming) -> Self {
        Self {
            core: NodeCore::new(id),
            timing,
            current_term: 0,
            voted_for: None,
            log: Vec::new(),
            committed_len: 0,
            applied_len: 0,
            role: Role::Follower,
            leader_id: None,
            next_index: BTreeMap::new(),
            match_len: BTreeMap::new(),
            votes_received: BTreeSet::new(),
            votes_needed: 0,
            election_deadline: 0.0,
            election_timer_at: None,
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_alive() && self.role == Role::Leader
    }

    #[must_use]
    pub const fn current_term(&self) -> u64 {
        self.current_term
    }

    #[must_use]
    pub const fn voted_for(&self) -> Option<&NodeId> {
        self.voted_for.as_ref()
    }

    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// 0-based index of the last committed entry, 0 when nothing is committed.
    #[must_use]
    pub const fn commit_index(&self) -> u64 {
        self.committed_len.saturating_sub(1) as u64
    }

    #[must_use]
    pub const fn committed_entries(&self) -> usize {
        self.committed_len
    }

    #[must_use]
    pub const fn last_applied(&self) -> u64 {
        self.applied_len.saturating_sub(1) as u64
    }

    #[must_use]
    pub const fn applied_entries(&self) -> usize {
        self.applied_len
    }

    #[must_use]
    pub const fn votes_received(&self) -> &BTreeSet<NodeId> {
        &self.votes_received
    }

    #[must_use]
    pub const fn election_deadline(&self) -> f64 {
        self.election_deadline
    }

    /// Append a client command. Leader only.
    ///
    /// Returns `false` without changing any state if this node is not an
    /// alive leader. Otherwise the entry is appended and replication starts
    /// immediately.
    pub fn submit_command(&mut self, command: impl Into<String>, ctx: &mut NodeContext<'_>) -> bool {
        if !self.is_leader() {
            tracing::debug!("node {}: rejected command, not leader", self.id());
            return false;
        }
        let command = command.into();
        let index = self.log.len() as u64;
        tracing::info!(
            "node {}: appended command {command:?} at index {index} (term {})",
            self.id(),
            self.current_term
        );
        ctx.record(
            DomainEventKind::CommandSubmitted,
            format!("command {command:?} at index {index}"),
        );
        self.log.push(LogEntry::new(self.current_term, command, index));

        self.broadcast_append_entries(ctx);
        self.advance_commit(ctx);
        true
    }

    fn last_log_index(&self) -> Option<u64> {
        self.log.len().checked_sub(1).map(|i| i as u64)
    }

    fn last_log_term(&self) -> u64 {
        self.log.last().map_or(0, |entry| entry.term)
    }

    // ----- role transitions -----

    fn become_follower(&mut self, term: u64, ctx: &mut NodeContext<'_>) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
            self.leader_id = None;
        }
        let previous = self.role;
        self.role = Role::Follower;
        self.clear_role_state();
        if previous != Role::Follower {
            tracing::info!(
                "node {}: became follower for term {}",
                self.id(),
                self.current_term
            );
            ctx.record(
                DomainEventKind::BecameFollower,
                format!("term {} (was {previous})", self.current_term),
            );
        }
        self.reset_election_timer(ctx);
    }

    fn become_candidate(&mut self, ctx: &mut NodeContext<'_>) {
        self.current_term += 1;
        self.role = Role::Candidate;
        self.leader_id = None;
        self.voted_for = Some(self.id().clone());
        self.votes_received = BTreeSet::from([self.id().clone()]);
        self.votes_needed = majority(ctx.cluster_size());

        tracing::info!(
            "node {}: became candidate for term {}, need {} votes",
            self.id(),
            self.current_term,
            self.votes_needed
        );
        ctx.record(
            DomainEventKind::BecameCandidate,
            format!("term {}", self.current_term),
        );

        let request = MessageBody::RequestVote {
            term: self.current_term,
            candidate_id: self.id().clone(),
            last_log_index: self.last_log_index(),
            last_log_term: self.last_log_term(),
        };
        for peer in ctx.peers() {
            ctx.send_message(&peer, request.clone(), 0.0);
        }
        self.reset_election_timer(ctx);

        // A single-node cluster wins on its own vote.
        self.check_votes(ctx);
    }

    fn become_leader(&mut self, ctx: &mut NodeContext<'_>) {
        self.role = Role::Leader;
        self.leader_id = Some(self.id().clone());
        self.votes_received.clear();

        let peers = ctx.peers();
        self.next_index = peers.iter().map(|p| (p.clone(), self.log.len())).collect();
        self.match_len = peers.into_iter().map(|p| (p, 0)).collect();

        tracing::info!(
            "node {}: became leader for term {}",
            self.id(),
            self.current_term
        );
        ctx.record(
            DomainEventKind::BecameLeader,
            format!("term {}", self.current_term),
        );

        self.broadcast_append_entries(ctx);
        self.schedule_heartbeat(ctx);
        self.advance_commit(ctx);
    }

    fn clear_role_state(&mut self) {
        self.votes_received.clear();
        self.votes_needed = 0;
        self.next_index.clear();
        self.match_len.clear();
    }

    fn check_votes(&mut self, ctx: &mut NodeContext<'_>) {
        if self.role == Role::Candidate && self.votes_received.len() >= majority(ctx.cluster_size())
        {
            self.become_leader(ctx);
        }
    }

    // ----- timers -----

    fn reset_election_timer(&mut self, ctx: &mut NodeContext<'_>) {
        let timeout = self.timing.draw_election_timeout(ctx.rng());
        self.election_deadline = ctx.now() + timeout;
        self.arm_election_timer(ctx);
    }

    /// Make sure a wake-up fires no later than the election deadline.
    fn arm_election_timer(&mut self, ctx: &mut NodeContext<'_>) {
        if self
            .election_timer_at
            .is_some_and(|at| at <= self.election_deadline)
        {
            return;
        }
        ctx.schedule_timeout(self.election_deadline - ctx.now(), Timer::Election);
        self.election_timer_at = Some(self.election_deadline);
    }

    fn election_due(&self, now: f64) -> bool {
        self.role != Role::Leader && now + DEADLINE_EPSILON >= self.election_deadline
    }

    fn schedule_heartbeat(&self, ctx: &mut NodeContext<'_>) {
        ctx.schedule_timeout(
            self.timing.heartbeat_interval,
            Timer::Heartbeat {
                term: self.current_term,
            },
        );
    }

    // ----- replication -----

    fn broadcast_append_entries(&self, ctx: &mut NodeContext<'_>) {
        for peer in ctx.peers() {
            self.send_append_entries(&peer, ctx);
        }
    }

    fn send_append_entries(&self, peer: &NodeId, ctx: &mut NodeContext<'_>) {
        let next = self
            .next_index
            .get(peer)
            .copied()
            .unwrap_or(self.log.len())
            .min(self.log.len());
        let prev = next.checked_sub(1);
        let body = MessageBody::AppendEntries {
            term: self.current_term,
            leader_id: self.id().clone(),
            prev_log_index: prev.map(|i| i as u64),
            prev_log_term: prev.map_or(0, |i| self.log[i].term),
            entries: self.log[next..].to_vec(),
            leader_commit: self.committed_len.checked_sub(1).map(|i| i as u64),
        };
        ctx.send_message(peer, body, 0.0);
    }

    /// Commit the highest entry of the current term held by a majority.
    fn advance_commit(&mut self, ctx: &mut NodeContext<'_>) {
        if self.role != Role::Leader {
            return;
        }
        let needed = majority(ctx.cluster_size());
        for len in (self.committed_len + 1..=self.log.len()).rev() {
            if self.log[len - 1].term != self.current_term {
                // Terms never decrease along the log.
                break;
            }
            let replicas = 1 + self.match_len.values().filter(|&&m| m >= len).count();
            if replicas >= needed {
                self.commit_to(len, ctx);
                break;
            }
        }
    }

    fn commit_to(&mut self, len: usize, ctx: &mut NodeContext<'_>) {
        let len = len.min(self.log.len());
        if len <= self.committed_len {
            return;
        }
        self.committed_len = len;
        tracing::debug!(
            "node {}: commit index advanced to {}",
            self.id(),
            self.commit_index()
        );
        ctx.record(
            DomainEventKind::EntriesCommitted,
            format!("commit index {}", self.commit_index()),
        );
        self.apply_committed();
    }

    fn apply_committed(&mut self) {
        while self.applied_len < self.committed_len {
            let entry = &self.log[self.applied_len];
            tracing::debug!(
                "node {}: applied {:?} (index {}, term {})",
                self.core.id(),
                entry.command,
                entry.index,
                entry.term
            );
            self.applied_len += 1;
        }
    }

    // ----- RPC handlers -----

    fn handle_request_vote(
        &mut self,
        src: &NodeId,
        term: u64,
        candidate_id: NodeId,
        last_log_index: Option<u64>,
        last_log_term: u64,
        ctx: &mut NodeContext<'_>,
    ) -> Result<(), NodeError> {
        if &candidate_id != src {
            return Err(NodeError::Malformed(format!(
                "RequestVote from {src} names candidate {candidate_id}"
            )));
        }
        if term > self.current_term {
            self.become_follower(term, ctx);
        }

        let log_ok = (last_log_term, last_log_index) >= (self.last_log_term(), self.last_log_index());
        let grant = term == self.current_term
            && self.voted_for.as_ref().is_none_or(|v| v == &candidate_id)
            && log_ok;

        if grant {
            self.voted_for = Some(candidate_id);
            self.reset_election_timer(ctx);
        }
        tracing::debug!(
            "node {}: vote for {src} in term {term}: {}",
            self.id(),
            if grant { "granted" } else { "denied" }
        );

        ctx.send_message(
            src,
            MessageBody::RequestVoteResponse {
                term: self.current_term,
                vote_granted: grant,
            },
            0.0,
        );
        Ok(())
    }

    fn handle_request_vote_response(
        &mut self,
        src: &NodeId,
        term: u64,
        vote_granted: bool,
        ctx: &mut NodeContext<'_>,
    ) -> Result<(), NodeError> {
        if term > self.current_term {
            self.become_follower(term, ctx);
            return Ok(());
        }
        if self.role != Role::Candidate || term < self.current_term {
            // Late answers to an election that is already decided.
            tracing::debug!("node {}: ignoring stale vote from {src}", self.id());
            return Ok(());
        }
        if vote_granted {
            self.votes_received.insert(src.clone());
            tracing::debug!(
                "node {}: vote from {src} ({}/{})",
                self.id(),
                self.votes_received.len(),
                self.votes_needed
            );
            self.check_votes(ctx);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_append_entries(
        &mut self,
        src: &NodeId,
        term: u64,
        leader_id: NodeId,
        prev_log_index: Option<u64>,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: Option<u64>,
        ctx: &mut NodeContext<'_>,
    ) -> Result<(), NodeError> {
        if term < self.current_term {
            tracing::debug!(
                "node {}: rejecting AppendEntries from {src}, stale term {term}",
                self.id()
            );
            self.respond_append(src, false, self.last_log_index(), ctx);
            return Ok(());
        }

        if term > self.current_term || self.role != Role::Follower {
            self.become_follower(term, ctx);
        } else {
            self.reset_election_timer(ctx);
        }
        self.leader_id = Some(leader_id);

        let start = position_to_len(prev_log_index)?;
        let consistent = match start.checked_sub(1) {
            None => true,
            Some(prev) => self.log.get(prev).is_some_and(|e| e.term == prev_log_term),
        };
        if !consistent {
            tracing::debug!(
                "node {}: log mismatch at {prev_log_index:?} with {src}",
                self.id()
            );
            self.respond_append(src, false, self.last_log_index(), ctx);
            return Ok(());
        }

        for (offset, entry) in entries.iter().enumerate() {
            if entry.index != (start + offset) as u64 {
                return Err(NodeError::Malformed(format!(
                    "entry index {} from {src}, expected {}",
                    entry.index,
                    start + offset
                )));
            }
        }

        let matched_len = start + entries.len();
        for entry in entries {
            let index = usize::try_from(entry.index)
                .map_err(|_| NodeError::Malformed(format!("entry index {}", entry.index)))?;
            match self.log.get(index) {
                Some(existing) if existing.term == entry.term => {}
                Some(_) => {
                    if index < self.committed_len {
                        return Err(NodeError::Internal(format!(
                            "leader {src} conflicts with committed entry {index}"
                        )));
                    }
                    tracing::info!(
                        "node {}: truncating log from index {index} ({} entries)",
                        self.id(),
                        self.log.len() - index
                    );
                    self.log.truncate(index);
                    self.log.push(entry);
                }
                None => self.log.push(entry),
            }
        }

        if let Some(leader_commit) = leader_commit {
            let target = position_to_len(Some(leader_commit))?.min(matched_len);
            self.commit_to(target, ctx);
        }

        let match_index = matched_len.checked_sub(1).map(|i| i as u64);
        self.respond_append(src, true, match_index, ctx);
        Ok(())
    }

    fn respond_append(
        &self,
        dst: &NodeId,
        success: bool,
        match_index: Option<u64>,
        ctx: &mut NodeContext<'_>,
    ) {
        ctx.send_message(
            dst,
            MessageBody::AppendEntriesResponse {
                term: self.current_term,
                success,
                match_index,
            },
            0.0,
        );
    }

    fn handle_append_entries_response(
        &mut self,
        src: &NodeId,
        term: u64,
        success: bool,
        match_index: Option<u64>,
        ctx: &mut NodeContext<'_>,
    ) -> Result<(), NodeError> {
        if term > self.current_term {
            self.become_follower(term, ctx);
            return Ok(());
        }
        if self.role != Role::Leader || term < self.current_term {
            return Err(NodeError::Unexpected(format!(
                "stale AppendEntriesResponse from {src} (term {term})"
            )));
        }
        let Some(next) = self.next_index.get(src).copied() else {
            return Err(NodeError::Unexpected(format!(
                "AppendEntriesResponse from non-peer {src}"
            )));
        };
        let reported_len = position_to_len(match_index)?;

        if success {
            if reported_len > self.log.len() {
                return Err(NodeError::Malformed(format!(
                    "{src} reports match index {match_index:?} beyond log length {}",
                    self.log.len()
                )));
            }
            let matched = self
                .match_len
                .get(src)
                .copied()
                .unwrap_or(0)
                .max(reported_len);
            self.match_len.insert(src.clone(), matched);
            self.next_index.insert(src.clone(), matched);
            self.advance_commit(ctx);
        } else {
            // Step back one entry; the follower's last index bounds how far.
            let next = next.saturating_sub(1).min(reported_len);
            self.next_index.insert(src.clone(), next);
            tracing::debug!(
                "node {}: next index for {src} now {next}, retrying on next heartbeat",
                self.id()
            );
        }
        Ok(())
    }
}

/// Convert a wire position (`None` = before the first entry) into a length.
fn position_to_len(position: Option<u64>) -> Result<usize, NodeError> {
    position.map_or(Ok(0), |index| {
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .ok_or_else(|| NodeError::Malformed(format!("log index {index} out of range")))
    })
}

impl Node for RaftNode {
    type Snapshot = RaftNodeSnapshot;

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn start(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        tracing::info!("node {}: initialised as follower", self.id());
        self.reset_election_timer(ctx);
        Ok(())
    }

    fn receive_message(
        &mut self,
        message: Message,
        ctx: &mut NodeContext<'_>,
    ) -> Result<(), NodeError> {
        tracing::debug!("node {}: received {message}", self.id());
        let Message { src, body, .. } = message;
        match body {
            MessageBody::RequestVote {
                term,
                candidate_id,
                last_log_index,
                last_log_term,
            } => self.handle_request_vote(
                &src,
                term,
                candidate_id,
                last_log_index,
                last_log_term,
                ctx,
            ),
            MessageBody::RequestVoteResponse { term, vote_granted } => {
                self.handle_request_vote_response(&src, term, vote_granted, ctx)
            }
            MessageBody::AppendEntries {
                term,
                leader_id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            } => self.handle_append_entries(
                &src,
                term,
                leader_id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
                ctx,
            ),
            MessageBody::AppendEntriesResponse {
                term,
                success,
                match_index,
            } => self.handle_append_entries_response(&src, term, success, match_index, ctx),
        }
    }

    fn tick(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        if self.election_due(ctx.now()) {
            tracing::debug!("node {}: election deadline passed", self.id());
            self.become_candidate(ctx);
        }
        Ok(())
    }

    fn handle_election_timeout(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        let now = ctx.now();
        if self.election_timer_at.is_some_and(|at| at <= now + DEADLINE_EPSILON) {
            self.election_timer_at = None;
        }
        if self.role == Role::Leader {
            return Ok(());
        }
        if self.election_due(now) {
            tracing::debug!(
                "node {}: election timeout in term {}",
                self.id(),
                self.current_term
            );
            self.become_candidate(ctx);
        } else {
            self.arm_election_timer(ctx);
        }
        Ok(())
    }

    fn handle_heartbeat_timeout(
        &mut self,
        term: u64,
        ctx: &mut NodeContext<'_>,
    ) -> Result<(), NodeError> {
        if self.role != Role::Leader || term != self.current_term {
            tracing::trace!("node {}: stale heartbeat timer for term {term}", self.id());
            return Ok(());
        }
        self.broadcast_append_entries(ctx);
        self.schedule_heartbeat(ctx);
        Ok(())
    }

    fn on_crash(&mut self, _ctx: &mut NodeContext<'_>) {
        tracing::debug!(
            "node {}: frozen as {} in term {}",
            self.id(),
            self.role,
            self.current_term
        );
    }

    fn on_recover(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        // Wake-ups that fired while crashed were dropped by the engine.
        self.election_timer_at = None;
        self.leader_id = None;
        self.become_follower(self.current_term, ctx);
        Ok(())
    }

    fn snapshot(&self) -> RaftNodeSnapshot {
        let candidate = self.role == Role::Candidate;
        RaftNodeSnapshot {
            id: self.id().clone(),
            alive: self.is_alive(),
            role: self.role,
            current_term: self.current_term,
            voted_for: self.voted_for.clone(),
            leader_id: self.leader_id.clone(),
            log_length: self.log.len(),
            log: self.log.clone(),
            commit_index: self.commit_index(),
            committed_entries: self.committed_len,
            last_applied: self.last_applied(),
            applied_entries: self.applied_len,
            votes_received: candidate.then(|| self.votes_received.iter().cloned().collect()),
            votes_needed: candidate.then_some(self.votes_needed),
        }
    }
}
