//! etcd v2 wire encoding: request parameters and error bodies.

use reqwest::Method;
use serde::Deserialize;
use tether_kv_types::DeleteRequest;
use tether_kv_types::KeyValueStoreError;
use tether_kv_types::ReadRequest;
use tether_kv_types::WatchRequest;
use tether_kv_types::WriteCommand;

/// Header carrying the store index at response time.
pub(crate) const ETCD_INDEX_HEADER: &str = "X-Etcd-Index";

pub(crate) type Params = Vec<(&'static str, String)>;

// etcd v2 error codes.
const ECODE_KEY_NOT_FOUND: u32 = 100;
const ECODE_TEST_FAILED: u32 = 101;
const ECODE_NOT_FILE: u32 = 102;
const ECODE_NOT_DIR: u32 = 104;
const ECODE_NODE_EXIST: u32 = 105;
const ECODE_DIR_NOT_EMPTY: u32 = 108;
const ECODE_RAFT_INTERNAL: u32 = 300;
const ECODE_LEADER_ELECT: u32 = 301;
const ECODE_EVENT_INDEX_CLEARED: u32 = 401;

/// Method, target key and form parameters for a write.
pub(crate) fn write_params(command: &WriteCommand) -> (Method, &str, Params) {
    let mut params: Params = vec![("value", command.value().unwrap_or_default().to_string())];
    let push_ttl = |params: &mut Params, ttl: &Option<u64>| {
        if let Some(ttl) = ttl {
            params.push(("ttl", ttl.to_string()));
        }
    };
    match command {
        WriteCommand::Set { key, ttl_seconds, .. } => {
            push_ttl(&mut params, ttl_seconds);
            (Method::PUT, key.as_str(), params)
        }
        WriteCommand::CreateOnly { key, ttl_seconds, .. } => {
            push_ttl(&mut params, ttl_seconds);
            params.push(("prevExist", "false".to_string()));
            (Method::PUT, key.as_str(), params)
        }
        WriteCommand::CompareAndSwap {
            key,
            ttl_seconds,
            prev_value,
            prev_exists,
            prev_index,
            ..
        } => {
            push_ttl(&mut params, ttl_seconds);
            if let Some(prev_value) = prev_value {
                params.push(("prevValue", prev_value.clone()));
            }
            if let Some(prev_index) = prev_index {
                params.push(("prevIndex", prev_index.to_string()));
            }
            if let Some(prev_exists) = prev_exists {
                params.push(("prevExist", prev_exists.to_string()));
            }
            (Method::PUT, key.as_str(), params)
        }
        WriteCommand::CreateInOrder { dir, ttl_seconds, .. } => {
            push_ttl(&mut params, ttl_seconds);
            (Method::POST, dir.as_str(), params)
        }
    }
}

pub(crate) fn read_params(request: &ReadRequest) -> Params {
    let mut params = Params::new();
    if request.recursive {
        params.push(("recursive", "true".to_string()));
    }
    if request.sorted {
        params.push(("sorted", "true".to_string()));
    }
    params
}

pub(crate) fn delete_params(request: &DeleteRequest) -> Params {
    let mut params = Params::new();
    if request.recursive {
        params.push(("recursive", "true".to_string()));
    }
    if request.dir {
        params.push(("dir", "true".to_string()));
    }
    if let Some(prev_value) = &request.prev_value {
        params.push(("prevValue", prev_value.clone()));
    }
    if let Some(prev_index) = request.prev_index {
        params.push(("prevIndex", prev_index.to_string()));
    }
    params
}

pub(crate) fn watch_params(request: &WatchRequest) -> Params {
    let mut params: Params = vec![("wait", "true".to_string())];
    if request.recursive {
        params.push(("recursive", "true".to_string()));
    }
    if let Some(wait_index) = request.wait_index {
        params.push(("waitIndex", wait_index.to_string()));
    }
    params
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorBody {
    pub error_code: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub cause: String,
    #[serde(default)]
    pub index: u64,
}

impl ErrorBody {
    /// Map onto the store error taxonomy. `key` is the request's normalized key.
    pub(crate) fn into_error(self, key: &str, wait_index: Option<u64>) -> KeyValueStoreError {
        let key = key.to_string();
        match self.error_code {
            ECODE_KEY_NOT_FOUND => KeyValueStoreError::NotFound { key },
            ECODE_TEST_FAILED => KeyValueStoreError::PreconditionFailed {
                key,
                cause: if self.cause.is_empty() { self.message } else { self.cause },
            },
            ECODE_NODE_EXIST => KeyValueStoreError::PreconditionFailed { key, cause: self.message },
            ECODE_NOT_FILE => KeyValueStoreError::NotAFile { key },
            ECODE_NOT_DIR => KeyValueStoreError::NotADirectory { key },
            ECODE_DIR_NOT_EMPTY => KeyValueStoreError::DirectoryNotEmpty { key },
            ECODE_EVENT_INDEX_CLEARED => {
                let (oldest, requested) = parse_cleared_cause(&self.cause)
                    .unwrap_or((self.index.saturating_add(1), wait_index.unwrap_or_default()));
                KeyValueStoreError::EventIndexCleared { requested, oldest }
            }
            ECODE_RAFT_INTERNAL | ECODE_LEADER_ELECT => KeyValueStoreError::Unavailable {
                reason: format!("{} ({})", self.message, self.error_code),
            },
            code => KeyValueStoreError::Failed {
                reason: format!("{} ({}): {}", self.message, code, self.cause),
            },
        }
    }
}

/// Parse `"... cleared [oldest/requested]"`.
fn parse_cleared_cause(cause: &str) -> Option<(u64, u64)> {
    let start = cause.rfind('[')?;
    let end = cause[start..].find(']')? + start;
    let (oldest, requested) = cause[start + 1..end].split_once('/')?;
    Some((oldest.trim().parse().ok()?, requested.trim().parse().ok()?))
}
