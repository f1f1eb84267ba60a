//! Compile-time checks on constant relationships.

use crate::api::IN_ORDER_KEY_WIDTH;
use crate::api::MAX_KEY_SIZE;
use crate::coordination::CAS_RETRY_INITIAL_BACKOFF_MS;
use crate::coordination::CAS_RETRY_MAX_BACKOFF_MS;
use crate::coordination::DEFAULT_ELECTION_RENEW_INTERVAL_MS;
use crate::coordination::DEFAULT_ELECTION_TTL_SECS;
use crate::network::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::network::DEFAULT_WATCH_TIMEOUT_MS;

const _: () = assert!(CAS_RETRY_INITIAL_BACKOFF_MS <= CAS_RETRY_MAX_BACKOFF_MS);
const _: () = assert!(DEFAULT_ELECTION_RENEW_INTERVAL_MS < DEFAULT_ELECTION_TTL_SECS * 1000 / 2);
const _: () = assert!(DEFAULT_REQUEST_TIMEOUT_MS < DEFAULT_WATCH_TIMEOUT_MS);
const _: () = assert!((IN_ORDER_KEY_WIDTH as u32) < MAX_KEY_SIZE);
// u64::MAX has 20 decimal digits.
const _: () = assert!(IN_ORDER_KEY_WIDTH >= 20);
