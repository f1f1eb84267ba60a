//! Centralized constants for the tether coordination client.
//!
//! Constants are fixed and immutable. Each one has explicit bounds so that no
//! code path allocates or waits without a limit.
//!
//! # Modules
//!
//! - [`api`]: Key and value size bounds, event history size
//! - [`coordination`]: Key layout, CAS retry and backoff bounds
//! - [`network`]: Request and long-poll timeouts

pub mod api;
mod assertions;
pub mod coordination;
pub mod network;

/// Prelude module for commonly used constants.
pub mod prelude {
    pub use crate::api::EVENT_HISTORY_SIZE;
    pub use crate::api::MAX_KEY_SIZE;
    pub use crate::api::MAX_VALUE_SIZE;
    pub use crate::coordination::CAS_RETRY_INITIAL_BACKOFF_MS;
    pub use crate::coordination::CAS_RETRY_MAX_BACKOFF_MS;
    pub use crate::coordination::MAX_CAS_RETRIES;
    pub use crate::network::DEFAULT_WATCH_TIMEOUT_MS;
}

pub use api::EVENT_HISTORY_SIZE;
pub use api::MAX_KEY_SIZE;
pub use api::MAX_VALUE_SIZE;
