//! Error types for coordination primitives.

use snafu::Snafu;
use tether_kv_types::KeyValueStoreError;

/// Errors from coordination primitives.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum CoordinationError {
    /// The caller's queue entry is gone or was modified by someone else.
    #[snafu(display("lock lost: entry '{key}' no longer held"))]
    LockLost {
        /// The queue entry key.
        key: String,
    },

    /// Another value holds (or took over) the election.
    #[snafu(display("'{value}' is not the leader of election '{name}'"))]
    NotLeader {
        /// Election name.
        name: String,
        /// The candidate value that was rejected.
        value: String,
    },

    /// Operation timed out.
    #[snafu(display("operation timed out: {operation}"))]
    Timeout {
        /// Description of the operation.
        operation: String,
    },

    /// Maximum retries exceeded.
    #[snafu(display("max retries exceeded for {operation}: {attempts} attempts"))]
    MaxRetriesExceeded {
        /// Description of the operation.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A caller-supplied argument is out of bounds.
    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument {
        /// What was wrong.
        reason: String,
    },

    /// Underlying storage error.
    #[snafu(display("storage error: {source}"))]
    Storage {
        /// The underlying error.
        source: KeyValueStoreError,
    },
}

impl CoordinationError {
    /// True for failed conditions: a rejected election value or a store-level
    /// precondition failure.
    pub fn is_precondition_failed(&self) -> bool {
        match self {
            CoordinationError::NotLeader { .. } => true,
            CoordinationError::Storage { source } => source.is_precondition_failed(),
            _ => false,
        }
    }

    /// True if the lock or leadership is gone and retrying will not restore it.
    pub fn is_ownership_lost(&self) -> bool {
        matches!(self, CoordinationError::LockLost { .. } | CoordinationError::NotLeader { .. })
    }
}

impl From<KeyValueStoreError> for CoordinationError {
    fn from(source: KeyValueStoreError) -> Self {
        CoordinationError::Storage { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_leader_is_a_precondition_failure() {
        let err = CoordinationError::NotLeader {
            name: "E".into(),
            value: "v2".into(),
        };
        assert!(err.is_precondition_failed());
        assert!(err.is_ownership_lost());
        assert_eq!(err.to_string(), "'v2' is not the leader of election 'E'");
    }

    #[test]
    fn storage_errors_keep_their_class() {
        let err: CoordinationError = KeyValueStoreError::PreconditionFailed {
            key: "/k".into(),
            cause: "[a != b]".into(),
        }
        .into();
        assert!(err.is_precondition_failed());
        assert!(!err.is_ownership_lost());

        let err: CoordinationError = KeyValueStoreError::DirectoryNotEmpty { key: "/d".into() }.into();
        assert!(!err.is_precondition_failed());
    }
}
