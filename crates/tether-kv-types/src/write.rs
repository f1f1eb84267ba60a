//! Write operation types.

use serde::Deserialize;
use serde::Serialize;

/// Commands that create or modify a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WriteCommand {
    /// Unconditionally set a leaf value.
    Set {
        key: String,
        value: String,
        ttl_seconds: Option<u64>,
    },
    /// Create a leaf; fails with `PreconditionFailed` if the key exists.
    CreateOnly {
        key: String,
        value: String,
        ttl_seconds: Option<u64>,
    },
    /// Set a leaf if every supplied condition holds.
    ///
    /// `prev_exists == Some(false)` behaves like `CreateOnly`. With any other
    /// condition an absent key fails with `NotFound`.
    CompareAndSwap {
        key: String,
        value: String,
        ttl_seconds: Option<u64>,
        prev_value: Option<String>,
        prev_exists: Option<bool>,
        prev_index: Option<u64>,
    },
    /// Create a child of `dir` whose name is the store-assigned index.
    CreateInOrder {
        dir: String,
        value: String,
        ttl_seconds: Option<u64>,
    },
}

impl WriteCommand {
    /// Key (or parent directory for in-order creation) targeted by the command.
    pub fn key(&self) -> &str {
        match self {
            WriteCommand::Set { key, .. }
            | WriteCommand::CreateOnly { key, .. }
            | WriteCommand::CompareAndSwap { key, .. } => key,
            WriteCommand::CreateInOrder { dir, .. } => dir,
        }
    }

    /// Value written by the command, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            WriteCommand::Set { value, .. }
            | WriteCommand::CreateOnly { value, .. }
            | WriteCommand::CompareAndSwap { value, .. }
            | WriteCommand::CreateInOrder { value, .. } => Some(value),
        }
    }
}

/// Request to perform a write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteRequest {
    pub command: WriteCommand,
}

impl WriteRequest {
    /// Set a key without expiry.
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            command: WriteCommand::Set {
                key: key.into(),
                value: value.into(),
                ttl_seconds: None,
            },
        }
    }

    /// Set a key that expires after `ttl_seconds`.
    pub fn set_with_ttl(key: impl Into<String>, value: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            command: WriteCommand::Set {
                key: key.into(),
                value: value.into(),
                ttl_seconds: Some(ttl_seconds),
            },
        }
    }

    /// Create a key only if it does not exist.
    pub fn create_only(key: impl Into<String>, value: impl Into<String>, ttl_seconds: Option<u64>) -> Self {
        Self {
            command: WriteCommand::CreateOnly {
                key: key.into(),
                value: value.into(),
                ttl_seconds,
            },
        }
    }

    /// Swap the value if the current value equals `prev_value`.
    pub fn compare_value_and_swap(
        key: impl Into<String>,
        value: impl Into<String>,
        prev_value: impl Into<String>,
        ttl_seconds: Option<u64>,
    ) -> Self {
        Self {
            command: WriteCommand::CompareAndSwap {
                key: key.into(),
                value: value.into(),
                ttl_seconds,
                prev_value: Some(prev_value.into()),
                prev_exists: None,
                prev_index: None,
            },
        }
    }

    /// Swap the value if the node's `modified_index` equals `prev_index`.
    pub fn compare_index_and_swap(
        key: impl Into<String>,
        value: impl Into<String>,
        prev_index: u64,
        ttl_seconds: Option<u64>,
    ) -> Self {
        Self {
            command: WriteCommand::CompareAndSwap {
                key: key.into(),
                value: value.into(),
                ttl_seconds,
                prev_value: None,
                prev_exists: None,
                prev_index: Some(prev_index),
            },
        }
    }

    /// Create a child of `dir` named by the store-assigned index.
    pub fn create_in_order(dir: impl Into<String>, value: impl Into<String>, ttl_seconds: Option<u64>) -> Self {
        Self {
            command: WriteCommand::CreateInOrder {
                dir: dir.into(),
                value: value.into(),
                ttl_seconds,
            },
        }
    }

    /// Create from a raw command.
    pub fn from_command(command: WriteCommand) -> Self {
        Self { command }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_value_and_swap_sets_only_value_condition() {
        let req = WriteRequest::compare_value_and_swap("/e", "v1", "v1", Some(10));
        match req.command {
            WriteCommand::CompareAndSwap {
                prev_value,
                prev_exists,
                prev_index,
                ttl_seconds,
                ..
            } => {
                assert_eq!(prev_value.as_deref(), Some("v1"));
                assert_eq!(prev_exists, None);
                assert_eq!(prev_index, None);
                assert_eq!(ttl_seconds, Some(10));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn command_key_and_value() {
        let req = WriteRequest::create_in_order("/locks/a", "", Some(5));
        assert_eq!(req.command.key(), "/locks/a");
        assert_eq!(req.command.value(), Some(""));
    }
}
