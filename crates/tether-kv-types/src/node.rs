//! Node and response model.

use serde::Deserialize;
use serde::Serialize;

/// A node in the store's hierarchical namespace.
///
/// Field names on the wire follow the etcd v2 JSON encoding
/// (`createdIndex`, `modifiedIndex`, `dir`, `nodes`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    /// Full, normalized key of this node.
    pub key: String,
    /// Value of a leaf node. Directories carry no value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Store index at which the node was created.
    #[serde(default)]
    pub created_index: u64,
    /// Store index of the last mutation of the node.
    #[serde(default)]
    pub modified_index: u64,
    /// Remaining time to live in seconds, if the node expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    /// Expiration timestamp (RFC 3339), if the node expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    /// Whether the node is a directory.
    #[serde(rename = "dir", default, skip_serializing_if = "is_false")]
    pub is_directory: bool,
    /// Children of a directory, present on directory reads.
    #[serde(rename = "nodes", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeState>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl NodeState {
    /// Last path segment of the key (`/a/b/c` -> `c`).
    pub fn name(&self) -> &str {
        crate::validation::key_name(&self.key)
    }

    /// The value, or an empty string for directories and empty markers.
    pub fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// Leaf children ordered by creation index.
    ///
    /// This is the queue order of in-order keys. Directories are skipped.
    pub fn leaves_by_creation(&self) -> Vec<&NodeState> {
        let mut leaves: Vec<&NodeState> = self.children.iter().filter(|c| !c.is_directory).collect();
        leaves.sort_by_key(|c| c.created_index);
        leaves
    }
}

/// The kind of mutation (or read) a response describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Get,
    Set,
    Create,
    Update,
    Delete,
    Expire,
    CompareAndSwap,
    CompareAndDelete,
}

impl Action {
    /// True if the event removed the node (explicit delete, CAD or TTL expiry).
    pub fn is_removal(&self) -> bool {
        matches!(self, Action::Delete | Action::Expire | Action::CompareAndDelete)
    }

    /// Wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Set => "set",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Expire => "expire",
            Action::CompareAndSwap => "compareAndSwap",
            Action::CompareAndDelete => "compareAndDelete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform result of every store operation and watch event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeResponse {
    /// What happened.
    pub action: Action,
    /// The affected node, in its post-operation state.
    pub node: NodeState,
    /// The node before the operation, when there was one.
    #[serde(rename = "prevNode", default, skip_serializing_if = "Option::is_none")]
    pub prev_node: Option<NodeState>,
    /// Store index at the time the response was produced (`X-Etcd-Index`).
    #[serde(skip)]
    pub etcd_index: u64,
}

impl NodeResponse {
    /// Index of the event this response describes.
    pub fn event_index(&self) -> u64 {
        self.node.modified_index
    }
}
