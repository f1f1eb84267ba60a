//! Coordination primitives built on a versioned key-value store.
//!
//! - [`LockManager`] - Fair FIFO mutual exclusion over in-order queue entries
//! - [`ReentrantLockManager`] - The same lock, re-enterable by one identity
//! - [`ElectionManager`] - Single-key leader election with TTL renewal
//! - [`LeaderElection`] - Background campaign keeping a candidate elected
//! - [`ScopedGuard`] / [`with_scope`] - Run a section while holding any of the above
//!
//! Everything goes through [`tether_traits::KeyValueStore`]; the store's
//! create-only and compare-and-swap writes are the only arbiters.
//!
//! ## Lock Example
//!
//! ```ignore
//! use tether_coordination::LockManager;
//!
//! let locks = LockManager::new(store);
//! let token = locks.acquire("jobs", 30, Some(Duration::from_secs(5))).await?;
//! // Protected critical section
//! locks.release(token).await?;
//! ```
//!
//! ## Leader Election Example
//!
//! ```ignore
//! use tether_coordination::{ElectionConfig, LeaderElection};
//!
//! let handle = LeaderElection::new(store, "scheduler", "node-1", ElectionConfig::default())
//!     .start()
//!     .await?;
//! if handle.is_leader() {
//!     // leader-only work
//! }
//! handle.stop().await;
//! ```

mod config;
mod election;
mod error;
mod lock;
mod reentrant;
mod retry;
mod scoped;
mod types;
pub mod verified;

pub use config::CoordinationConfig;
pub use election::ElectionConfig;
pub use election::ElectionHandle;
pub use election::ElectionManager;
pub use election::LeaderElection;
pub use election::LeadershipState;
pub use error::CoordinationError;
pub use lock::LockManager;
pub use reentrant::ReentrantLockManager;
pub use scoped::LeadershipScope;
pub use scoped::LockScope;
pub use scoped::ReentrantLockScope;
pub use scoped::Scope;
pub use scoped::ScopedGuard;
pub use scoped::with_scope;
pub use types::ElectionOutcome;
pub use types::LeadershipToken;
pub use types::LockToken;
pub use types::ReentrantToken;
