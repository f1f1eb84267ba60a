//! Backoff and bounded retry for idempotent store calls.
//!
//! Only calls that are safe to repeat go through [`retry_transient`]: reads,
//! deletes by key, and compare operations on a value the caller owns. An
//! in-order create is never retried, since a lost reply would leave an
//! orphaned queue entry behind.

use std::future::Future;
use std::time::Duration;

use tether_constants::coordination::CAS_RETRY_INITIAL_BACKOFF_MS;
use tether_constants::coordination::CAS_RETRY_MAX_BACKOFF_MS;
use tether_constants::coordination::MAX_CAS_RETRIES;
use tether_kv_types::KeyValueStoreError;
use tracing::debug;
use tracing::warn;

use crate::verified;

/// Sleep one jittered backoff step, never past `remaining_ms`.
///
/// Returns the backoff for the next step.
pub(crate) async fn backoff(
    operation: &str,
    backoff_ms: u64,
    remaining_ms: Option<u64>,
    error: &KeyValueStoreError,
) -> u64 {
    let result = verified::compute_backoff_with_jitter(backoff_ms, CAS_RETRY_MAX_BACKOFF_MS, rand::random::<u64>());
    let sleep_ms = remaining_ms.map_or(result.sleep_ms, |remaining| result.sleep_ms.min(remaining));
    debug!(operation, error = %error, sleep_ms, "transient store error, backing off");
    tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
    result.next_backoff_ms
}

/// Run `call` until it succeeds or fails with a non-transient error.
///
/// Gives up after `MAX_CAS_RETRIES` attempts and returns the last error.
pub(crate) async fn retry_transient<T, F, Fut>(operation: &str, mut call: F) -> Result<T, KeyValueStoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, KeyValueStoreError>>,
{
    let mut backoff_ms = CAS_RETRY_INITIAL_BACKOFF_MS;
    let mut attempt = 1;
    loop {
        match call().await {
            Err(e) if e.is_transient() && attempt < MAX_CAS_RETRIES => {
                backoff_ms = backoff(operation, backoff_ms, None, &e).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                warn!(operation, attempts = attempt, error = %e, "giving up on transient store error");
                return Err(e);
            }
            result => return result,
        }
    }
}
