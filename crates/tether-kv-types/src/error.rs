//! Store-level error taxonomy.

use snafu::Snafu;

/// Errors returned by a `KeyValueStore` implementation.
///
/// Precondition failures are expected under contention and drive the retry
/// logic of the coordination engines; they are not bugs.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum KeyValueStoreError {
    /// The key does not exist (never created, deleted, or expired).
    #[snafu(display("key '{key}' not found"))]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A CAS/CAD condition or a create-only write did not hold.
    #[snafu(display("precondition failed on '{key}': {cause}"))]
    PreconditionFailed {
        /// Key the condition was evaluated against.
        key: String,
        /// What did not match, e.g. `[v1 != v2]`.
        cause: String,
    },

    /// A value operation targeted a directory.
    #[snafu(display("'{key}' is a directory"))]
    NotAFile {
        /// The directory key.
        key: String,
    },

    /// A directory operation targeted a leaf, or a path crosses a leaf.
    #[snafu(display("'{key}' is not a directory"))]
    NotADirectory {
        /// The offending key.
        key: String,
    },

    /// Non-recursive delete of a populated directory.
    #[snafu(display("directory '{key}' is not empty"))]
    DirectoryNotEmpty {
        /// The directory key.
        key: String,
    },

    /// A watch asked for an index older than the retained event history.
    #[snafu(display("event index {requested} cleared, oldest retained is {oldest}"))]
    EventIndexCleared {
        /// Requested wait index.
        requested: u64,
        /// Oldest index still in the history.
        oldest: u64,
    },

    /// The request did not complete within its deadline.
    #[snafu(display("operation timed out after {duration_ms}ms"))]
    Timeout {
        /// The deadline that elapsed.
        duration_ms: u64,
    },

    /// The store could not be reached.
    #[snafu(display("store unavailable: {reason}"))]
    Unavailable {
        /// Transport-level description.
        reason: String,
    },

    /// The key is malformed or too large.
    #[snafu(display("invalid key '{key}': {reason}"))]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The value exceeds the size limit.
    #[snafu(display("value size {size} exceeds maximum of {max} bytes"))]
    ValueTooLarge {
        /// Value size in bytes.
        size: u32,
        /// Maximum allowed size.
        max: u32,
    },

    /// Any other store failure.
    #[snafu(display("operation failed: {reason}"))]
    Failed {
        /// Description of the failure.
        reason: String,
    },
}

impl KeyValueStoreError {
    /// True when a CAS, CAD or create-only condition did not hold.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, KeyValueStoreError::PreconditionFailed { .. })
    }

    /// True for failures where repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KeyValueStoreError::Timeout { .. }
                | KeyValueStoreError::Unavailable { .. }
                | KeyValueStoreError::EventIndexCleared { .. }
        )
    }

    /// True when the key is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyValueStoreError::NotFound { .. })
    }
}
