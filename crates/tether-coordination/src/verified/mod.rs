//! Pure functions behind the coordination engines.
//!
//! Everything here is deterministic and free of I/O: time and randomness are
//! passed in explicitly. The async engines are the imperative shell around
//! these decisions.
//!
//! - [`lock`]: key layout, queue position, backoff with jitter
//! - [`election`]: key layout, renewal timing, lease lapse

pub mod election;
pub mod lock;

pub use election::election_key;
pub use election::is_lease_lapsed;
pub use election::is_valid_election_timing;
pub use lock::BackoffResult;
pub use lock::QueuePosition;
pub use lock::compute_backoff_with_jitter;
pub use lock::is_valid_name;
pub use lock::is_valid_ttl;
pub use lock::lock_dir;
pub use lock::queue_position;
pub use lock::wait_budget_ms;
