//! Reentrant variant of the fair lock.
//!
//! Queue entries carry the caller's identity as their value. An identity
//! that already holds the lock re-enters without touching the queue; a
//! per-entry hold count (local to this manager) decides when the entry is
//! actually deleted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tether_constants::coordination::MAX_REENTRANT_DEPTH;
use tether_kv_types::WriteRequest;
use tether_traits::KeyValueStore;
use tracing::debug;
use tracing::warn;

use crate::config::CoordinationConfig;
use crate::error::CoordinationError;
use crate::lock::LockManager;
use crate::retry;
use crate::types::LockToken;
use crate::types::ReentrantToken;

/// Manager for reentrant lock operations.
pub struct ReentrantLockManager<S: KeyValueStore + ?Sized + 'static> {
    locks: LockManager<S>,
    store: Arc<S>,
    /// Hold count per queue entry key.
    holds: Mutex<HashMap<String, u32>>,
}

impl<S: KeyValueStore + ?Sized + 'static> ReentrantLockManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CoordinationConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: CoordinationConfig) -> Self {
        Self {
            locks: LockManager::with_config(store.clone(), config),
            store,
            holds: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for `identity`.
    ///
    /// If the entry at the head of the queue already carries `identity`, no
    /// entry is created and the hold count is incremented. Otherwise queues
    /// like [`LockManager::acquire`].
    pub async fn acquire(
        &self,
        name: &str,
        identity: &str,
        ttl_secs: u64,
        timeout: Option<Duration>,
    ) -> Result<ReentrantToken, CoordinationError> {
        if identity.is_empty() {
            return Err(CoordinationError::InvalidArgument {
                reason: "reentrant identity must not be empty".to_string(),
            });
        }
        LockManager::<S>::check_ttl(ttl_secs)?;

        if let Some(front) = self.locks.front_entry(name).await?
            && front.value_or_empty() == identity
        {
            let depth = {
                let mut holds = self.holds.lock();
                let count = holds.entry(front.key.clone()).or_insert(0);
                if *count >= MAX_REENTRANT_DEPTH {
                    return Err(CoordinationError::InvalidArgument {
                        reason: format!("reentrant depth {} reached on '{}'", MAX_REENTRANT_DEPTH, name),
                    });
                }
                *count += 1;
                *count
            };
            debug!(name, identity, key = %front.key, depth, "reentrant lock re-entered");
            return Ok(ReentrantToken {
                lock: LockToken::from_node(name, &front),
                identity: identity.to_string(),
            });
        }

        let lock = self.locks.acquire_with_value(name, identity, ttl_secs, timeout).await?;
        self.holds.lock().insert(lock.key.clone(), 1);
        debug!(name, identity, key = %lock.key, "reentrant lock acquired");
        Ok(ReentrantToken {
            lock,
            identity: identity.to_string(),
        })
    }

    /// Extend the entry's TTL.
    ///
    /// Compares on the identity rather than the index, so any of the nested
    /// tokens for an entry can renew it, and a repeated renewal is harmless.
    pub async fn renew(&self, token: &mut ReentrantToken, ttl_secs: u64) -> Result<(), CoordinationError> {
        LockManager::<S>::check_ttl(ttl_secs)?;
        let renewed = retry::retry_transient("renew reentrant lock", || {
            self.store.write(WriteRequest::compare_value_and_swap(
                token.lock.key.clone(),
                token.identity.clone(),
                token.identity.clone(),
                Some(ttl_secs),
            ))
        })
        .await;
        match renewed {
            Ok(resp) => {
                token.lock.modified_index = resp.node.modified_index;
                Ok(())
            }
            Err(e) if e.is_precondition_failed() || e.is_not_found() => {
                warn!(key = %token.lock.key, identity = %token.identity, "reentrant lock lost on renew");
                Err(CoordinationError::LockLost {
                    key: token.lock.key.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drop one hold; the entry is deleted when the count reaches zero.
    pub async fn release(&self, token: ReentrantToken) -> Result<(), CoordinationError> {
        let remaining = {
            let mut holds = self.holds.lock();
            match holds.get_mut(&token.lock.key) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    Some(*count)
                }
                _ => {
                    holds.remove(&token.lock.key);
                    None
                }
            }
        };
        if let Some(remaining) = remaining {
            debug!(key = %token.lock.key, remaining, "reentrant hold released");
            return Ok(());
        }
        self.locks.release(token.lock).await
    }

    /// Identity holding lock `name`, if any.
    pub async fn get_active_value(&self, name: &str) -> Result<Option<String>, CoordinationError> {
        Ok(self.locks.front_entry(name).await?.map(|entry| entry.value_or_empty().to_string()))
    }

    /// Holds this manager tracks for the token's entry.
    pub fn hold_count(&self, token: &ReentrantToken) -> u32 {
        self.holds.lock().get(&token.lock.key).copied().unwrap_or(0)
    }
}
