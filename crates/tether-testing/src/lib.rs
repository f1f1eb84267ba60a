//! Testing infrastructure for tether.
//!
//! - `DeterministicKeyValueStore`: in-memory store with etcd v2 semantics
//!   (indices, TTL expiry, event history, in-order keys). Uses `tokio::time`,
//!   so tests under `#[tokio::test(start_paused = true)]` can advance through
//!   TTLs without waiting.
//! - `FaultyKeyValueStore`: wraps any store and injects per-operation errors
//!   or response latency.
//! - `init_test_tracing`: install a subscriber once per test binary.

mod faulty;
mod inmemory;

pub use faulty::FaultyKeyValueStore;
pub use faulty::StoreOp;
pub use inmemory::DeterministicKeyValueStore;

/// Install a `tracing` subscriber honoring `RUST_LOG`, ignoring repeat calls.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tether=debug,tether_coordination=debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}
