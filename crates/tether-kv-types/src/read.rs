//! Read, delete and watch request types.

use serde::Deserialize;
use serde::Serialize;

/// Request to read a key or list a directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadRequest {
    pub key: String,
    /// Include the whole subtree, not only direct children.
    #[serde(default)]
    pub recursive: bool,
    /// Return children in key order.
    #[serde(default)]
    pub sorted: bool,
}

impl ReadRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            recursive: false,
            sorted: false,
        }
    }

    /// List a directory with its children sorted by key.
    pub fn sorted_listing(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            recursive: false,
            sorted: true,
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }
}

/// Request to delete a key, optionally guarded by a compare condition.
///
/// With `prev_value` or `prev_index` set this is a compare-and-delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteRequest {
    pub key: String,
    /// Delete a directory and everything beneath it.
    #[serde(default)]
    pub recursive: bool,
    /// Allow deleting an empty directory.
    #[serde(default)]
    pub dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_index: Option<u64>,
}

impl DeleteRequest {
    /// Create an unconditional delete of a leaf key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            recursive: false,
            dir: false,
            prev_value: None,
            prev_index: None,
        }
    }

    /// Compare-and-delete on the current value.
    pub fn compare_and_delete(key: impl Into<String>, prev_value: impl Into<String>) -> Self {
        Self {
            prev_value: Some(prev_value.into()),
            ..Self::new(key)
        }
    }

    /// Compare-and-delete on the modification index.
    pub fn compare_index_and_delete(key: impl Into<String>, prev_index: u64) -> Self {
        Self {
            prev_index: Some(prev_index),
            ..Self::new(key)
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn directory(mut self) -> Self {
        self.dir = true;
        self
    }

    /// True if a compare condition is attached.
    pub fn is_conditional(&self) -> bool {
        self.prev_value.is_some() || self.prev_index.is_some()
    }
}

/// Long-poll request for the next change at or under a key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchRequest {
    pub key: String,
    /// Also report changes to descendants.
    #[serde(default)]
    pub recursive: bool,
    /// Return the first event with index >= this value, replaying history if
    /// needed. `None` waits for the next future event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_index: Option<u64>,
    /// Bound on how long the request may block. `None` uses the store default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WatchRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            recursive: false,
            wait_index: None,
            timeout_ms: None,
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn since(mut self, wait_index: u64) -> Self {
        self.wait_index = Some(wait_index);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}
