//! Messages exchanged between simulated RAFT nodes.
//!
//! A message only exists as the payload of a transport event; it is never
//! stored by a node after its handler returns.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{LogEntry, NodeId};

/// The closed set of RPC kinds the transport carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    RequestVote,
    RequestVoteResponse,
    AppendEntries,
    AppendEntriesResponse,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestVote => "RequestVote",
            Self::RequestVoteResponse => "RequestVoteResponse",
            Self::AppendEntries => "AppendEntries",
            Self::AppendEntriesResponse => "AppendEntriesResponse",
        };
        f.write_str(name)
    }
}

/// RPC body. Log positions use `None` for "before the first entry".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageBody {
    /// Candidates solicit votes from all peers.
    RequestVote {
        term: u64,
        candidate_id: NodeId,
        /// Index of the candidate's last log entry.
        last_log_index: Option<u64>,
        /// Term of the candidate's last log entry, 0 for an empty log.
        last_log_term: u64,
    },
    RequestVoteResponse {
        term: u64,
        vote_granted: bool,
    },
    /// Leaders replicate entries and assert liveness (empty `entries`).
    AppendEntries {
        term: u64,
        leader_id: NodeId,
        /// Index of the entry immediately preceding `entries`.
        prev_log_index: Option<u64>,
        /// Term of the entry at `prev_log_index`, 0 when there is none.
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        /// Highest index the leader knows to be committed.
        leader_commit: Option<u64>,
    },
    AppendEntriesResponse {
        term: u64,
        success: bool,
        /// On success, the last index now known to match the leader. On
        /// failure, the responder's last log index as a hint.
        match_index: Option<u64>,
    },
}

impl MessageBody {
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::RequestVote { .. } => MessageType::RequestVote,
            Self::RequestVoteResponse { .. } => MessageType::RequestVoteResponse,
            Self::AppendEntries { .. } => MessageType::AppendEntries,
            Self::AppendEntriesResponse { .. } => MessageType::AppendEntriesResponse,
        }
    }

    /// The sender's term carried by every RPC.
    #[must_use]
    pub const fn term(&self) -> u64 {
        match self {
            Self::RequestVote { term, .. }
            | Self::RequestVoteResponse { term, .. }
            | Self::AppendEntries { term, .. }
            | Self::AppendEntriesResponse { term, .. } => *term,
        }
    }
}

/// A message in flight between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub src: NodeId,
    pub dst: NodeId,
    pub body: MessageBody,
}

impl Message {
    #[must_use]
    pub const fn new(src: NodeId, dst: NodeId, body: MessageBody) -> Self {
        Self { src, dst, body }
    }

    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (term {})",
            self.message_type(),
            self.src,
            self.dst,
            self.body.term()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_matches_body() {
        let body = MessageBody::RequestVoteResponse {
            term: 4,
            vote_granted: true,
        };
        assert_eq!(body.message_type(), MessageType::RequestVoteResponse);
        assert_eq!(body.term(), 4);
    }

    #[test]
    fn test_message_display() {
        let message = Message::new(
            NodeId::from("node_0"),
            NodeId::from("node_1"),
            MessageBody::AppendEntriesResponse {
                term: 2,
                success: false,
                match_index: None,
            },
        );
        assert_eq!(
            message.to_string(),
            "AppendEntriesResponse node_0 -> node_1 (term 2)"
        );
    }
}
