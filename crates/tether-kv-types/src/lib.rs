//! Types for the tether key-value store interface.
//!
//! The model follows the etcd v2 keys API: a hierarchical namespace of nodes,
//! each stamped with store-wide `created_index`/`modified_index` counters, and
//! a uniform [`NodeResponse`] carrying the affected node and its prior state.
//!
//! The store itself is reached through the `KeyValueStore` trait in
//! `tether-traits`; this crate only holds the data that crosses that boundary.

mod config;
mod error;
mod node;
mod read;
mod validation;
mod write;

pub use config::ConfigError;
pub use error::KeyValueStoreError;
pub use node::Action;
pub use node::NodeResponse;
pub use node::NodeState;
pub use read::DeleteRequest;
pub use read::ReadRequest;
pub use read::WatchRequest;
pub use validation::in_order_key_name;
pub use validation::join_key;
pub use validation::key_name;
pub use validation::normalize_key;
pub use validation::parent_key;
pub use validation::validate_key;
pub use validation::validate_write_command;
pub use write::WriteCommand;
pub use write::WriteRequest;
