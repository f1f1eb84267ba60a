//! Scoped acquisition: run a section while holding a lock or leadership.
//!
//! A [`ScopedGuard`] releases what it holds when dropped, so a section that
//! returns early, errors, or panics still gives the resource back. Prefer
//! [`ScopedGuard::release`] or [`with_scope`] where the release outcome
//! matters; the drop path is best effort.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_traits::KeyValueStore;
use tracing::debug;
use tracing::warn;

use crate::election::ElectionManager;
use crate::error::CoordinationError;
use crate::lock::LockManager;
use crate::reentrant::ReentrantLockManager;
use crate::types::LeadershipToken;
use crate::types::LockToken;
use crate::types::ReentrantToken;

/// Something that can be acquired before a section and released after it.
#[async_trait]
pub trait Scope: Send + Sync + 'static {
    /// Proof of holding the resource.
    type Token: Clone + Send + Sync + 'static;

    async fn acquire(&self) -> Result<Self::Token, CoordinationError>;

    async fn release(&self, token: Self::Token) -> Result<(), CoordinationError>;
}

/// Hold fair lock `name` for the section.
pub struct LockScope<S: KeyValueStore + ?Sized + 'static> {
    locks: Arc<LockManager<S>>,
    name: String,
    ttl_secs: u64,
    timeout: Option<Duration>,
}

impl<S: KeyValueStore + ?Sized + 'static> LockScope<S> {
    pub fn new(locks: Arc<LockManager<S>>, name: impl Into<String>, ttl_secs: u64, timeout: Option<Duration>) -> Self {
        Self {
            locks,
            name: name.into(),
            ttl_secs,
            timeout,
        }
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized + 'static> Scope for LockScope<S> {
    type Token = LockToken;

    async fn acquire(&self) -> Result<LockToken, CoordinationError> {
        self.locks.acquire(&self.name, self.ttl_secs, self.timeout).await
    }

    async fn release(&self, token: LockToken) -> Result<(), CoordinationError> {
        self.locks.release(token).await
    }
}

/// Hold reentrant lock `name` as `identity` for the section.
pub struct ReentrantLockScope<S: KeyValueStore + ?Sized + 'static> {
    locks: Arc<ReentrantLockManager<S>>,
    name: String,
    identity: String,
    ttl_secs: u64,
    timeout: Option<Duration>,
}

impl<S: KeyValueStore + ?Sized + 'static> ReentrantLockScope<S> {
    pub fn new(
        locks: Arc<ReentrantLockManager<S>>,
        name: impl Into<String>,
        identity: impl Into<String>,
        ttl_secs: u64,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            locks,
            name: name.into(),
            identity: identity.into(),
            ttl_secs,
            timeout,
        }
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized + 'static> Scope for ReentrantLockScope<S> {
    type Token = ReentrantToken;

    async fn acquire(&self) -> Result<ReentrantToken, CoordinationError> {
        self.locks.acquire(&self.name, &self.identity, self.ttl_secs, self.timeout).await
    }

    async fn release(&self, token: ReentrantToken) -> Result<(), CoordinationError> {
        self.locks.release(token).await
    }
}

/// Hold election `name` as `value` for the section.
///
/// Acquiring is a single `set_or_renew`; it fails with `NotLeader` rather
/// than waiting if another value leads.
pub struct LeadershipScope<S: KeyValueStore + ?Sized + 'static> {
    elections: Arc<ElectionManager<S>>,
    name: String,
    value: String,
    ttl_secs: u64,
}

impl<S: KeyValueStore + ?Sized + 'static> LeadershipScope<S> {
    pub fn new(elections: Arc<ElectionManager<S>>, name: impl Into<String>, value: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            elections,
            name: name.into(),
            value: value.into(),
            ttl_secs,
        }
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized + 'static> Scope for LeadershipScope<S> {
    type Token = LeadershipToken;

    async fn acquire(&self) -> Result<LeadershipToken, CoordinationError> {
        let outcome = self.elections.set_or_renew(&self.name, &self.value, self.ttl_secs).await?;
        Ok(LeadershipToken {
            name: self.name.clone(),
            value: self.value.clone(),
            modified_index: outcome.modified_index(),
        })
    }

    async fn release(&self, token: LeadershipToken) -> Result<(), CoordinationError> {
        match self.elections.delete(&token.name, &token.value).await {
            Ok(_) => Ok(()),
            // Expired or taken over: nothing of ours left to remove.
            Err(CoordinationError::NotLeader { .. }) => {
                debug!(election = %token.name, value = %token.value, "leadership already gone on release");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Holds a scope's token; releases it on drop if not released explicitly.
pub struct ScopedGuard<C: Scope> {
    scope: Arc<C>,
    token: Option<C::Token>,
}

impl<C: Scope> ScopedGuard<C> {
    pub async fn acquire(scope: Arc<C>) -> Result<Self, CoordinationError> {
        let token = scope.acquire().await?;
        Ok(Self {
            scope,
            token: Some(token),
        })
    }

    pub fn token(&self) -> Option<&C::Token> {
        self.token.as_ref()
    }

    /// Release now and report the outcome.
    pub async fn release(mut self) -> Result<(), CoordinationError> {
        match self.token.take() {
            Some(token) => self.scope.release(token).await,
            None => Ok(()),
        }
    }
}

impl<C: Scope> Drop for ScopedGuard<C> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("scoped guard dropped outside a runtime; held resource will expire by TTL");
            return;
        };
        let scope = Arc::clone(&self.scope);
        handle.spawn(async move {
            if let Err(e) = scope.release(token).await {
                warn!(error = %e, "failed to release scope on drop");
            }
        });
    }
}

/// Acquire `scope`, run `section` with the token, then release.
///
/// The release runs on every path. If both the section and the release fail,
/// the section's error is returned and the release error is logged.
pub async fn with_scope<C, F, Fut, T, E>(scope: Arc<C>, section: F) -> Result<T, E>
where
    C: Scope,
    F: FnOnce(C::Token) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<CoordinationError>,
{
    let token = scope.acquire().await?;
    // Releases on drop if the section panics or is cancelled.
    let guard = ScopedGuard {
        scope,
        token: Some(token.clone()),
    };
    let result = section(token).await;
    match (result, guard.release().await) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!(error = %release_err, "release failed after section error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use tether_testing::DeterministicKeyValueStore;

    use super::*;

    #[tokio::test]
    async fn test_guard_release_reports_outcome() {
        let store = DeterministicKeyValueStore::new();
        let locks = Arc::new(LockManager::new(store.clone()));
        let scope = Arc::new(LockScope::new(locks.clone(), "L", 10, None));

        let guard = ScopedGuard::acquire(scope).await.unwrap();
        assert!(guard.token().is_some());
        assert!(locks.get_active_index("L").await.unwrap().is_some());
        guard.release().await.unwrap();
        assert!(locks.get_active_index("L").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_with_scope_returns_section_value() {
        let store = DeterministicKeyValueStore::new();
        let elections = Arc::new(ElectionManager::new(store));
        let scope = Arc::new(LeadershipScope::new(elections.clone(), "E", "v1", 10));

        let seen = with_scope(scope, |token| async move { Ok::<_, CoordinationError>(token.value) })
            .await
            .unwrap();
        assert_eq!(seen, "v1");
        assert_eq!(elections.get("E").await.unwrap(), None);
    }
}
