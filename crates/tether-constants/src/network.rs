//! Network timeouts.

/// Default timeout for a non-blocking store request (milliseconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Default bound on a single long-poll `wait` (milliseconds).
///
/// A wait that sees no event within this interval fails with `Timeout` and
/// the coordination engines simply issue the next one.
pub const DEFAULT_WATCH_TIMEOUT_MS: u64 = 30_000;

/// Default store endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2379";
