use serde::{Deserialize, Serialize};

/// One unit of replicated state in a RAFT log.
///
/// `index` is the 0-based position of the entry in the log. It is stored
/// redundantly so that entries shipped in `AppendEntries` can be checked
/// against the position they land in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Term of the leader that created the entry.
    pub term: u64,
    /// Opaque client command.
    pub command: String,
    /// Position of the entry in the log.
    pub index: u64,
}

impl LogEntry {
    #[must_use]
    pub fn new(term: u64, command: impl Into<String>, index: u64) -> Self {
        Self {
            term,
            command: command.into(),
            index,
        }
    }
}
