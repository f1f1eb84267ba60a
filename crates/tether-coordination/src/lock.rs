//! Fair distributed lock built on in-order keys.
//!
//! Each acquisition attempt creates an in-order child of the lock's queue
//! directory. The store-assigned `created_index` is the ticket: the entry with
//! the lowest index holds the lock, every other entry waits on the entry
//! directly ahead of it. Releasing or expiring an entry wakes exactly its
//! successor, so grants are strictly FIFO and there is no thundering herd.
//!
//! ```text
//! /_tether/locks/L/00000000000000000004   <- holder
//! /_tether/locks/L/00000000000000000009   <- waits on ...04
//! /_tether/locks/L/00000000000000000012   <- waits on ...09
//! ```

use std::sync::Arc;
use std::time::Duration;

use tether_constants::coordination::CAS_RETRY_INITIAL_BACKOFF_MS;
use tether_kv_types::DeleteRequest;
use tether_kv_types::KeyValueStoreError;
use tether_kv_types::NodeState;
use tether_kv_types::ReadRequest;
use tether_kv_types::WatchRequest;
use tether_kv_types::WriteRequest;
use tether_traits::KeyValueStore;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::config::CoordinationConfig;
use crate::error::CoordinationError;
use crate::retry;
use crate::types::LockToken;
use crate::verified;
use crate::verified::QueuePosition;

/// Manager for fair lock operations.
pub struct LockManager<S: KeyValueStore + ?Sized + 'static> {
    store: Arc<S>,
    config: CoordinationConfig,
}

impl<S: KeyValueStore + ?Sized + 'static> LockManager<S> {
    /// Create a lock manager with the default key layout.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CoordinationConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: CoordinationConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    /// Acquire the lock, queueing behind earlier requests.
    ///
    /// Blocks until the caller's entry is first in line. With a `timeout`, the
    /// entry is removed and `Timeout` returned if that does not happen in time.
    /// If the entry expires while queued (TTL too short for the wait), fails
    /// with `LockLost`.
    pub async fn acquire(
        &self,
        name: &str,
        ttl_secs: u64,
        timeout: Option<Duration>,
    ) -> Result<LockToken, CoordinationError> {
        self.acquire_with_value(name, "", ttl_secs, timeout).await
    }

    /// Take the lock only if nobody is queued ahead.
    pub async fn try_acquire(&self, name: &str, ttl_secs: u64) -> Result<Option<LockToken>, CoordinationError> {
        let (dir, token) = self.enqueue(name, "", ttl_secs).await?;
        let mut pending = PendingEntry::new(self.store.clone(), token.key.clone());

        let entries = retry::retry_transient("list lock queue", || self.list_queue(&dir)).await?;
        match Self::position(&entries, &token) {
            QueuePosition::Head => {
                pending.disarm();
                debug!(name, key = %token.key, "lock acquired without waiting");
                Ok(Some(token))
            }
            QueuePosition::Waiting { ahead, .. } => {
                trace!(name, ahead, "lock busy");
                pending.remove().await;
                Ok(None)
            }
            QueuePosition::Missing => {
                pending.disarm();
                Err(CoordinationError::LockLost { key: token.key })
            }
        }
    }

    /// Queue an entry holding `value` and wait until it reaches the head.
    pub(crate) async fn acquire_with_value(
        &self,
        name: &str,
        value: &str,
        ttl_secs: u64,
        timeout: Option<Duration>,
    ) -> Result<LockToken, CoordinationError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let (dir, mut token) = self.enqueue(name, value, ttl_secs).await?;
        // Removes the entry if this future is dropped before the lock is held.
        let mut pending = PendingEntry::new(self.store.clone(), token.key.clone());
        let mut backoff_ms = CAS_RETRY_INITIAL_BACKOFF_MS;

        loop {
            let remaining_ms = deadline.map(|d| d.saturating_duration_since(Instant::now()).as_millis() as u64);
            if remaining_ms == Some(0) {
                debug!(name, key = %token.key, "lock acquire timed out");
                pending.remove().await;
                return Err(CoordinationError::Timeout {
                    operation: format!("acquire lock '{}'", name),
                });
            }

            let entries = match self.list_queue(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.is_transient() => {
                    backoff_ms = retry::backoff("list lock queue", backoff_ms, remaining_ms, &e).await;
                    continue;
                }
                Err(e) => {
                    pending.remove().await;
                    return Err(e.into());
                }
            };

            let predecessor = match Self::position(&entries, &token) {
                QueuePosition::Head => {
                    if let Some(own) = entries.iter().find(|e| e.key == token.key) {
                        token.modified_index = own.modified_index;
                    }
                    pending.disarm();
                    info!(name, key = %token.key, ticket = token.created_index, "lock acquired");
                    return Ok(token);
                }
                QueuePosition::Missing => {
                    pending.disarm();
                    warn!(name, key = %token.key, "queue entry vanished while waiting");
                    return Err(CoordinationError::LockLost { key: token.key });
                }
                QueuePosition::Waiting { predecessor, ahead } => {
                    debug!(name, ahead, predecessor = %entries[predecessor].key, "waiting for predecessor");
                    &entries[predecessor]
                }
            };

            // Start just past the predecessor's last write so a release between
            // the listing and the wait is still observed.
            let request = WatchRequest::new(predecessor.key.clone())
                .since(predecessor.modified_index.saturating_add(1))
                .with_timeout_ms(verified::wait_budget_ms(remaining_ms, self.config.wait_timeout_ms));
            match self.store.watch(request).await {
                Ok(event) => {
                    trace!(name, action = %event.action, key = %event.node.key, "predecessor changed");
                    backoff_ms = CAS_RETRY_INITIAL_BACKOFF_MS;
                }
                Err(KeyValueStoreError::Timeout { .. }) | Err(KeyValueStoreError::EventIndexCleared { .. }) => {}
                Err(e) if e.is_transient() => {
                    backoff_ms = retry::backoff("wait for predecessor", backoff_ms, remaining_ms, &e).await;
                }
                // Predecessor already gone.
                Err(KeyValueStoreError::NotFound { .. }) => {}
                Err(e) => {
                    pending.remove().await;
                    return Err(e.into());
                }
            }
        }
    }

    /// Extend the entry's TTL without changing its queue position.
    ///
    /// Fails with `LockLost` if the entry expired or was modified since the
    /// token was last updated.
    pub async fn renew(&self, token: &mut LockToken, ttl_secs: u64) -> Result<(), CoordinationError> {
        Self::check_ttl(ttl_secs)?;
        let request = WriteRequest::compare_index_and_swap(
            token.key.clone(),
            token.value.clone(),
            token.modified_index,
            Some(ttl_secs),
        );
        match self.store.write(request).await {
            Ok(resp) => {
                token.modified_index = resp.node.modified_index;
                debug!(name = %token.name, key = %token.key, ttl_secs, "lock renewed");
                Ok(())
            }
            Err(e) if e.is_precondition_failed() || e.is_not_found() => {
                warn!(name = %token.name, key = %token.key, error = %e, "lock lost on renew");
                Err(CoordinationError::LockLost { key: token.key.clone() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the entry. Releasing an already released or expired entry succeeds.
    ///
    /// Transient store errors are retried; a lingering entry would block every
    /// waiter until its TTL ran out.
    pub async fn release(&self, token: LockToken) -> Result<(), CoordinationError> {
        let released = retry::retry_transient("release lock", || self.store.delete(DeleteRequest::new(token.key.clone())));
        match released.await {
            Ok(_) => {
                info!(name = %token.name, key = %token.key, "lock released");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(name = %token.name, key = %token.key, "lock already released");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Creation index of the current holder, if anyone holds the lock.
    pub async fn get_active_index(&self, name: &str) -> Result<Option<u64>, CoordinationError> {
        Ok(self.front_entry(name).await?.map(|entry| entry.created_index))
    }

    /// True if `token`'s entry is currently first in line.
    pub async fn is_held(&self, token: &LockToken) -> Result<bool, CoordinationError> {
        Ok(self.front_entry(&token.name).await?.is_some_and(|entry| entry.key == token.key))
    }

    /// The entry currently holding lock `name`.
    pub(crate) async fn front_entry(&self, name: &str) -> Result<Option<NodeState>, CoordinationError> {
        let dir = self.queue_dir(name)?;
        let entries = retry::retry_transient("list lock queue", || self.list_queue(&dir)).await?;
        Ok(entries.into_iter().next())
    }

    async fn enqueue(&self, name: &str, value: &str, ttl_secs: u64) -> Result<(String, LockToken), CoordinationError> {
        Self::check_ttl(ttl_secs)?;
        let dir = self.queue_dir(name)?;
        let resp = self.store.write(WriteRequest::create_in_order(dir.clone(), value, Some(ttl_secs))).await?;
        let token = LockToken::from_node(name, &resp.node);
        debug!(name, key = %token.key, ticket = token.created_index, ttl_secs, "queued lock entry");
        Ok((dir, token))
    }

    /// Live entries ordered by creation index. A missing directory is an empty queue.
    async fn list_queue(&self, dir: &str) -> Result<Vec<NodeState>, KeyValueStoreError> {
        match self.store.read(ReadRequest::sorted_listing(dir)).await {
            Ok(resp) => Ok(resp.node.leaves_by_creation().into_iter().cloned().collect()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn position(entries: &[NodeState], token: &LockToken) -> QueuePosition {
        let indices: Vec<u64> = entries.iter().map(|e| e.created_index).collect();
        verified::queue_position(&indices, token.created_index)
    }

    fn queue_dir(&self, name: &str) -> Result<String, CoordinationError> {
        if !verified::is_valid_name(name) {
            return Err(CoordinationError::InvalidArgument {
                reason: format!("invalid lock name '{}'", name),
            });
        }
        Ok(verified::lock_dir(&self.config.locks_root, name))
    }

    pub(crate) fn check_ttl(ttl_secs: u64) -> Result<(), CoordinationError> {
        if !verified::is_valid_ttl(ttl_secs) {
            return Err(CoordinationError::InvalidArgument {
                reason: format!("ttl {}s out of range", ttl_secs),
            });
        }
        Ok(())
    }

}

/// Queue entry that is deleted unless disarmed.
///
/// Dropping it (e.g. when an `acquire` future is cancelled) spawns a
/// best-effort delete; outside a runtime the entry's TTL cleans up.
struct PendingEntry<S: KeyValueStore + ?Sized + 'static> {
    store: Arc<S>,
    key: Option<String>,
}

impl<S: KeyValueStore + ?Sized + 'static> PendingEntry<S> {
    fn new(store: Arc<S>, key: String) -> Self {
        Self { store, key: Some(key) }
    }

    fn disarm(&mut self) {
        self.key = None;
    }

    async fn remove(&mut self) {
        if let Some(key) = self.key.take() {
            delete_entry(self.store.as_ref(), key).await;
        }
    }
}

impl<S: KeyValueStore + ?Sized + 'static> Drop for PendingEntry<S> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        debug!(key = %key, "acquire cancelled, removing queue entry");
        handle.spawn(async move { delete_entry(store.as_ref(), key).await });
    }
}

async fn delete_entry<S: KeyValueStore + ?Sized>(store: &S, key: String) {
    if let Err(e) = retry::retry_transient("remove queue entry", || store.delete(DeleteRequest::new(key.clone()))).await
        && !e.is_not_found()
    {
        warn!(key = %key, error = %e, "failed to remove queue entry");
    }
}

#[cfg(test)]
mod tests {
    use tether_testing::DeterministicKeyValueStore;

    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release_uncontended() {
        let store = DeterministicKeyValueStore::new();
        let locks = LockManager::new(store.clone());

        let token = locks.acquire("L", 10, None).await.unwrap();
        assert_eq!(token.name, "L");
        assert!(token.key.starts_with("/_tether/locks/L/"));
        assert!(locks.is_held(&token).await.unwrap());
        assert_eq!(locks.get_active_index("L").await.unwrap(), Some(token.created_index));

        locks.release(token).await.unwrap();
        assert_eq!(locks.get_active_index("L").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_try_acquire_busy_leaves_no_entry() {
        let store = DeterministicKeyValueStore::new();
        let locks = LockManager::new(store.clone());

        let held = locks.try_acquire("L", 10).await.unwrap().unwrap();
        assert!(locks.try_acquire("L", 10).await.unwrap().is_none());
        assert_eq!(store.children_of("/_tether/locks/L").await, vec![held.key.clone()]);
    }

    #[tokio::test]
    async fn test_renew_keeps_position_and_updates_index() {
        let store = DeterministicKeyValueStore::new();
        let locks = LockManager::new(store.clone());

        let mut token = locks.acquire("L", 10, None).await.unwrap();
        let before = token.modified_index;
        locks.renew(&mut token, 20).await.unwrap();
        assert!(token.modified_index > before);
        assert!(locks.is_held(&token).await.unwrap());

        let mut stale = token.clone();
        stale.modified_index = before;
        let err = locks.renew(&mut stale, 20).await.unwrap_err();
        assert!(matches!(err, CoordinationError::LockLost { .. }));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = DeterministicKeyValueStore::new();
        let locks = LockManager::new(store);

        let token = locks.acquire("L", 10, None).await.unwrap();
        locks.release(token.clone()).await.unwrap();
        locks.release(token).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let locks = LockManager::new(DeterministicKeyValueStore::new());
        assert!(matches!(locks.acquire("", 10, None).await, Err(CoordinationError::InvalidArgument { .. })));
        assert!(matches!(locks.acquire("L", 0, None).await, Err(CoordinationError::InvalidArgument { .. })));
    }
}
