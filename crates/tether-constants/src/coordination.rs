//! Coordination primitive constants.

/// Default key prefix under which lock queues live.
pub const DEFAULT_LOCKS_ROOT: &str = "/_tether/locks";

/// Default key prefix under which election records live.
pub const DEFAULT_ELECTIONS_ROOT: &str = "/_tether/elections";

/// Maximum CAS attempts for a single logical operation before giving up.
pub const MAX_CAS_RETRIES: u32 = 100;

/// Initial backoff after a transient store failure (milliseconds).
pub const CAS_RETRY_INITIAL_BACKOFF_MS: u64 = 10;

/// Upper bound on backoff after repeated transient failures (milliseconds).
pub const CAS_RETRY_MAX_BACKOFF_MS: u64 = 1_000;

/// Maximum TTL accepted for a lock entry or election claim (one day, seconds).
pub const MAX_COORDINATION_TTL_SECS: u64 = 86_400;

/// Maximum nested acquisitions of a reentrant lock by one identity.
pub const MAX_REENTRANT_DEPTH: u32 = 1_024;

/// Default leadership TTL for the campaign loop (seconds).
pub const DEFAULT_ELECTION_TTL_SECS: u64 = 15;

/// Default renewal period for the campaign loop (milliseconds).
pub const DEFAULT_ELECTION_RENEW_INTERVAL_MS: u64 = 5_000;

/// Default delay before a follower retries after an error (milliseconds).
pub const DEFAULT_ELECTION_RETRY_DELAY_MS: u64 = 1_000;
