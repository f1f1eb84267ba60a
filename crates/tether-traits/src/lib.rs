//! Core traits for tether.
//!
//! Defines the interface the coordination engines consume. Implementations
//! live in `tether-client` (HTTP against an etcd v2 endpoint) and
//! `tether-testing` (deterministic in-memory store).

use async_trait::async_trait;
use tether_kv_types::DeleteRequest;
use tether_kv_types::KeyValueStoreError;
use tether_kv_types::NodeResponse;
use tether_kv_types::ReadRequest;
use tether_kv_types::WatchRequest;
use tether_kv_types::WriteRequest;

/// Versioned, hierarchical key-value store with CAS, CAD and long-poll watch.
///
/// Every mutation is stamped with a store-wide monotonically increasing index.
/// Conditions that do not hold fail with `KeyValueStoreError::PreconditionFailed`;
/// implementations must evaluate and apply a conditional write atomically.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key, or list a directory.
    ///
    /// Fails with `NotFound` if the key is absent or expired.
    async fn read(&self, request: ReadRequest) -> Result<NodeResponse, KeyValueStoreError>;

    /// Set, create, compare-and-swap, or create in order.
    async fn write(&self, request: WriteRequest) -> Result<NodeResponse, KeyValueStoreError>;

    /// Delete a key or directory, optionally as a compare-and-delete.
    async fn delete(&self, request: DeleteRequest) -> Result<NodeResponse, KeyValueStoreError>;

    /// Block until the next change at (or under) a key.
    ///
    /// Fails with `Timeout` after the request's bounded interval.
    async fn watch(&self, request: WatchRequest) -> Result<NodeResponse, KeyValueStoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn read(&self, request: ReadRequest) -> Result<NodeResponse, KeyValueStoreError> {
        (**self).read(request).await
    }

    async fn write(&self, request: WriteRequest) -> Result<NodeResponse, KeyValueStoreError> {
        (**self).write(request).await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<NodeResponse, KeyValueStoreError> {
        (**self).delete(request).await
    }

    async fn watch(&self, request: WatchRequest) -> Result<NodeResponse, KeyValueStoreError> {
        (**self).watch(request).await
    }
}
