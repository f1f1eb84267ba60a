//! Pure lock computation functions.
//!
//! # Tiger Style
//!
//! - Uses saturating arithmetic for all calculations
//! - Time is passed explicitly (no calls to system time)

use tether_constants::coordination::MAX_COORDINATION_TTL_SECS;
use tether_kv_types::join_key;
use tether_kv_types::normalize_key;

/// Directory holding the queue entries of lock `name`.
#[inline]
pub fn lock_dir(locks_root: &str, name: &str) -> String {
    join_key(locks_root, name)
}

/// A lock or election name must name something below its root.
#[inline]
pub fn is_valid_name(name: &str) -> bool {
    normalize_key(name) != "/"
}

/// TTLs are whole seconds in `1..=MAX_COORDINATION_TTL_SECS`.
#[inline]
pub fn is_valid_ttl(ttl_secs: u64) -> bool {
    ttl_secs > 0 && ttl_secs <= MAX_COORDINATION_TTL_SECS
}

/// Where a queue entry stands among the live entries of its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    /// First in line: the lock is held.
    Head,
    /// Queued behind others.
    Waiting {
        /// Index into the ordered entries of the entry directly ahead.
        predecessor: usize,
        /// Number of entries ahead.
        ahead: u32,
    },
    /// The entry is not in the queue (expired or deleted).
    Missing,
}

/// Locate `own_created_index` in creation indices sorted ascending.
///
/// # Example
///
/// ```ignore
/// assert_eq!(queue_position(&[4, 9, 12], 4), QueuePosition::Head);
/// assert_eq!(queue_position(&[4, 9, 12], 12), QueuePosition::Waiting { predecessor: 1, ahead: 2 });
/// assert_eq!(queue_position(&[4, 9, 12], 7), QueuePosition::Missing);
/// ```
pub fn queue_position(sorted_created_indices: &[u64], own_created_index: u64) -> QueuePosition {
    match sorted_created_indices.binary_search(&own_created_index) {
        Ok(0) => QueuePosition::Head,
        Ok(pos) => QueuePosition::Waiting {
            predecessor: pos - 1,
            ahead: u32::try_from(pos).unwrap_or(u32::MAX),
        },
        Err(_) => QueuePosition::Missing,
    }
}

/// How long the next wait may block, in milliseconds.
///
/// Bounded by the per-wait timeout and by what is left of the caller's
/// deadline; never zero so the store does not treat it as "no timeout".
#[inline]
pub fn wait_budget_ms(remaining_ms: Option<u64>, wait_timeout_ms: u64) -> u64 {
    match remaining_ms {
        Some(remaining) => remaining.min(wait_timeout_ms).max(1),
        None => wait_timeout_ms.max(1),
    }
}

/// Result of backoff calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffResult {
    /// Sleep duration in milliseconds (includes jitter).
    pub sleep_ms: u64,
    /// Next backoff value (for exponential increase).
    pub next_backoff_ms: u64,
}

/// Compute exponential backoff with jitter.
///
/// Additive jitter keeps clients that failed together from retrying together.
///
/// # Arguments
///
/// * `current_backoff_ms` - Current backoff duration in milliseconds
/// * `max_backoff_ms` - Maximum allowed backoff in milliseconds
/// * `jitter_seed` - Random value reduced modulo `current_backoff_ms / 2 + 1`
///
/// # Example
///
/// ```ignore
/// let result = compute_backoff_with_jitter(100, 1000, 25);
/// assert_eq!(result.sleep_ms, 125);
/// assert_eq!(result.next_backoff_ms, 200);
/// ```
#[inline]
pub fn compute_backoff_with_jitter(current_backoff_ms: u64, max_backoff_ms: u64, jitter_seed: u64) -> BackoffResult {
    let max_jitter = current_backoff_ms.saturating_div(2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;

    BackoffResult {
        sleep_ms: current_backoff_ms.saturating_add(jitter),
        next_backoff_ms: current_backoff_ms.saturating_mul(2).min(max_backoff_ms),
    }
}
