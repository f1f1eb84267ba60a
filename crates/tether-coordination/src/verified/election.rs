//! Pure election computation functions.

use tether_kv_types::join_key;

/// Key holding the record of election `name`.
#[inline]
pub fn election_key(elections_root: &str, name: &str) -> String {
    join_key(elections_root, name)
}

/// Renewal must happen at least twice per lease.
///
/// With `renew_interval_ms * 2 <= ttl_secs * 1000` a single lost renewal
/// does not cost the term.
#[inline]
pub fn is_valid_election_timing(ttl_secs: u64, renew_interval_ms: u64) -> bool {
    renew_interval_ms > 0 && renew_interval_ms.saturating_mul(2) <= ttl_secs.saturating_mul(1000)
}

/// A leader that has not renewed for a full TTL must assume the term ended.
#[inline]
pub fn is_lease_lapsed(ms_since_last_renewal: u64, ttl_secs: u64) -> bool {
    ms_since_last_renewal >= ttl_secs.saturating_mul(1000)
}
