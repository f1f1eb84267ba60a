//! Store API bounds.
//!
//! These mirror the limits of the etcd v2 keys API that the coordination
//! engines are written against.

/// Maximum size of a single key in bytes (1 KB).
///
/// Applied to every request before it leaves the client.
pub const MAX_KEY_SIZE: u32 = 1024;

/// Maximum size of a single value in bytes (1 MB).
pub const MAX_VALUE_SIZE: u32 = 1024 * 1024;

/// Number of past events the store retains for `wait` with an explicit index.
///
/// A `wait_index` older than the oldest retained event fails with
/// `EventIndexCleared`. etcd v2 keeps the last 1000 events.
pub const EVENT_HISTORY_SIZE: u32 = 1000;

/// Width of the zero-padded suffix of in-order keys.
///
/// Twenty digits hold any `u64`, so lexical order of the child names equals
/// creation order.
pub const IN_ORDER_KEY_WIDTH: usize = 20;
