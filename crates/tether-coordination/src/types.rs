//! Tokens handed to callers of the coordination engines.

use serde::Deserialize;
use serde::Serialize;
use tether_kv_types::NodeState;

/// Proof of a queued or held lock entry.
///
/// The entry key plus its last known `modified_index` is all the state a
/// client keeps; everything else lives in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    /// Lock name the entry was queued under.
    pub name: String,
    /// Full key of the queue entry.
    pub key: String,
    /// Entry value: empty for a plain lock, the identity for a reentrant one.
    pub value: String,
    /// Creation index; defines queue position.
    pub created_index: u64,
    /// Index of the last write to the entry, used for renewal.
    pub modified_index: u64,
}

impl LockToken {
    pub(crate) fn from_node(name: &str, node: &NodeState) -> Self {
        Self {
            name: name.to_string(),
            key: node.key.clone(),
            value: node.value_or_empty().to_string(),
            created_index: node.created_index,
            modified_index: node.modified_index,
        }
    }

    /// Store-assigned ticket; strictly increasing in request order.
    pub fn ticket(&self) -> u64 {
        self.created_index
    }
}

/// A hold on a reentrant lock by one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReentrantToken {
    /// The queue entry shared by all nested holds.
    pub lock: LockToken,
    /// Identity the entry is held for.
    pub identity: String,
}

/// Result of a successful `set_or_renew`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionOutcome {
    /// The election key was absent and is now ours.
    Elected { modified_index: u64 },
    /// We already held the key and refreshed its TTL.
    Renewed { modified_index: u64 },
}

impl ElectionOutcome {
    pub fn modified_index(&self) -> u64 {
        match self {
            ElectionOutcome::Elected { modified_index } | ElectionOutcome::Renewed { modified_index } => *modified_index,
        }
    }

    /// True if this call started a new term.
    pub fn is_new_term(&self) -> bool {
        matches!(self, ElectionOutcome::Elected { .. })
    }
}

/// A held leadership term, as returned by the leadership scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadershipToken {
    /// Election name.
    pub name: String,
    /// Value written to the election key.
    pub value: String,
    /// Index of the write that granted or renewed the term.
    pub modified_index: u64,
}
