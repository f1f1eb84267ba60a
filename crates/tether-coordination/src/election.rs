//! Leader election on a single TTL'd key.
//!
//! The election record is `/<elections-root>/<name>` holding the leader's
//! value. Claiming is a create-only write; renewing is a CAS on the value,
//! which only the holder can reproduce. The store's CAS is the sole arbiter,
//! so at most one value is ever elected at a time.
//!
//! [`ElectionManager`] exposes the one-shot operations. [`LeaderElection`]
//! runs them in a background campaign:
//!
//! - **Leader**: renew every `renew_interval_ms`; a rejected renewal or a
//!   lease that lapses without renewal drops back to follower.
//! - **Follower**: wait on the election key for a delete or expire event,
//!   then try to claim it.
//! - **Valid transitions**: Follower <-> Transitioning <-> Leader

use std::sync::Arc;
use std::time::Duration;

use tether_constants::coordination::DEFAULT_ELECTION_RENEW_INTERVAL_MS;
use tether_constants::coordination::DEFAULT_ELECTION_RETRY_DELAY_MS;
use tether_constants::coordination::DEFAULT_ELECTION_TTL_SECS;
use tether_constants::coordination::MAX_CAS_RETRIES;
use tether_kv_types::DeleteRequest;
use tether_kv_types::KeyValueStoreError;
use tether_kv_types::NodeState;
use tether_kv_types::ReadRequest;
use tether_kv_types::WatchRequest;
use tether_kv_types::WriteRequest;
use tether_traits::KeyValueStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::CoordinationConfig;
use crate::error::CoordinationError;
use crate::lock::LockManager;
use crate::retry;
use crate::types::ElectionOutcome;
use crate::verified;

/// One-shot election operations.
pub struct ElectionManager<S: KeyValueStore + ?Sized + 'static> {
    store: Arc<S>,
    config: CoordinationConfig,
}

impl<S: KeyValueStore + ?Sized + 'static> ElectionManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, CoordinationConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: CoordinationConfig) -> Self {
        Self { store, config }
    }

    /// Claim the election for `value`, or refresh the TTL if `value` holds it.
    ///
    /// Fails with `NotLeader` if another value holds the election.
    pub async fn set_or_renew(
        &self,
        name: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<ElectionOutcome, CoordinationError> {
        LockManager::<S>::check_ttl(ttl_secs)?;
        let key = self.election_key(name)?;

        for attempt in 1..=MAX_CAS_RETRIES {
            match self.store.write(WriteRequest::create_only(key.clone(), value, Some(ttl_secs))).await {
                Ok(resp) => {
                    info!(name, value, index = resp.node.modified_index, "elected");
                    return Ok(ElectionOutcome::Elected {
                        modified_index: resp.node.modified_index,
                    });
                }
                Err(e) if e.is_precondition_failed() => {}
                Err(e) => return Err(e.into()),
            }

            let renew = WriteRequest::compare_value_and_swap(key.clone(), value, value, Some(ttl_secs));
            match self.store.write(renew).await {
                Ok(resp) => {
                    debug!(name, value, index = resp.node.modified_index, "election renewed");
                    return Ok(ElectionOutcome::Renewed {
                        modified_index: resp.node.modified_index,
                    });
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(name, value, error = %e, "election held by another value");
                    return Err(CoordinationError::NotLeader {
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
                // Expired between the create and the CAS; claim it again.
                Err(e) if e.is_not_found() => {
                    debug!(name, attempt, "election key vanished, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoordinationError::MaxRetriesExceeded {
            operation: format!("set_or_renew election '{}'", name),
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Current leader value; `None` if never set or expired.
    pub async fn get(&self, name: &str) -> Result<Option<String>, CoordinationError> {
        Ok(self.record(name).await?.map(|node| node.value_or_empty().to_string()))
    }

    /// Resign: delete the record if it still holds `expected_value`.
    ///
    /// Returns `false` if there was no record. Fails with `NotLeader` if the
    /// record holds a different value.
    pub async fn delete(&self, name: &str, expected_value: &str) -> Result<bool, CoordinationError> {
        let key = self.election_key(name)?;
        let deleted = retry::retry_transient("resign election", || {
            self.store.delete(DeleteRequest::compare_and_delete(key.clone(), expected_value))
        });
        match deleted.await {
            Ok(_) => {
                info!(name, value = expected_value, "resigned");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) if e.is_precondition_failed() => Err(CoordinationError::NotLeader {
                name: name.to_string(),
                value: expected_value.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// The raw election record.
    pub(crate) async fn record(&self, name: &str) -> Result<Option<NodeState>, CoordinationError> {
        let key = self.election_key(name)?;
        match retry::retry_transient("read election", || self.store.read(ReadRequest::new(key.clone()))).await {
            Ok(resp) => Ok(Some(resp.node)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Block until the record changes after `since`, or `timeout_ms` elapses.
    ///
    /// Returns `true` if the record was removed (deleted or expired).
    pub(crate) async fn wait_for_vacancy(&self, name: &str, since: u64, timeout_ms: u64) -> Result<bool, CoordinationError> {
        let key = self.election_key(name)?;
        let request = WatchRequest::new(key).since(since).with_timeout_ms(timeout_ms);
        match self.store.watch(request).await {
            Ok(event) => Ok(event.action.is_removal()),
            Err(KeyValueStoreError::Timeout { .. }) | Err(KeyValueStoreError::EventIndexCleared { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn wait_timeout_ms(&self) -> u64 {
        self.config.wait_timeout_ms
    }

    fn election_key(&self, name: &str) -> Result<String, CoordinationError> {
        if !verified::is_valid_name(name) {
            return Err(CoordinationError::InvalidArgument {
                reason: format!("invalid election name '{}'", name),
            });
        }
        Ok(verified::election_key(&self.config.elections_root, name))
    }
}

/// Configuration for the campaign loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionConfig {
    /// TTL of the election record in seconds.
    /// Leadership is lost if not renewed within this time.
    pub ttl_secs: u64,
    /// How often the leader renews (at most half the TTL).
    pub renew_interval_ms: u64,
    /// How long a follower waits before retrying after a store error.
    pub retry_delay_ms: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_ELECTION_TTL_SECS,
            renew_interval_ms: DEFAULT_ELECTION_RENEW_INTERVAL_MS,
            retry_delay_ms: DEFAULT_ELECTION_RETRY_DELAY_MS,
        }
    }
}

/// Current leadership state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipState {
    /// Not currently the leader.
    Follower,
    /// Currently the leader.
    Leader {
        /// Index of the last successful claim or renewal.
        modified_index: u64,
    },
    /// Trying to claim leadership.
    Transitioning,
}

impl LeadershipState {
    /// Returns true if currently the leader.
    pub fn is_leader(&self) -> bool {
        matches!(self, LeadershipState::Leader { .. })
    }
}

/// Background campaign for one candidate.
///
/// # Example
///
/// ```ignore
/// let election = LeaderElection::new(store, "scheduler", "node-1", ElectionConfig::default());
/// let handle = election.start().await?;
///
/// let mut rx = handle.subscribe();
/// while rx.changed().await.is_ok() {
///     if rx.borrow().is_leader() {
///         // leader-only work
///     }
/// }
/// ```
pub struct LeaderElection<S: KeyValueStore + ?Sized + 'static> {
    elections: ElectionManager<S>,
    name: String,
    candidate: String,
    config: ElectionConfig,
}

impl<S: KeyValueStore + ?Sized + 'static> LeaderElection<S> {
    /// Create a campaign for `candidate` in election `name`.
    pub fn new(store: Arc<S>, name: impl Into<String>, candidate: impl Into<String>, config: ElectionConfig) -> Self {
        Self::with_manager(ElectionManager::new(store), name, candidate, config)
    }

    pub fn with_manager(
        elections: ElectionManager<S>,
        name: impl Into<String>,
        candidate: impl Into<String>,
        config: ElectionConfig,
    ) -> Self {
        Self {
            elections,
            name: name.into(),
            candidate: candidate.into(),
            config,
        }
    }

    /// Start campaigning in a background task.
    pub async fn start(self) -> Result<ElectionHandle, CoordinationError> {
        if !verified::is_valid_election_timing(self.config.ttl_secs, self.config.renew_interval_ms) {
            return Err(CoordinationError::InvalidArgument {
                reason: format!(
                    "renew interval {}ms must be positive and at most half of ttl {}s",
                    self.config.renew_interval_ms, self.config.ttl_secs
                ),
            });
        }
        if self.candidate.is_empty() {
            return Err(CoordinationError::InvalidArgument {
                reason: "candidate value must not be empty".to_string(),
            });
        }

        let (state_tx, state_rx) = watch::channel(LeadershipState::Follower);
        let cancel = CancellationToken::new();
        let candidate = self.candidate.clone();
        let task = tokio::spawn(self.campaign(state_tx, cancel.clone()));

        Ok(ElectionHandle {
            state_rx,
            cancel,
            task: Some(task),
            candidate,
        })
    }

    async fn campaign(self, state_tx: watch::Sender<LeadershipState>, cancel: CancellationToken) {
        let renew_interval = Duration::from_millis(self.config.renew_interval_ms);
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);
        // Start of the last successful claim or renewal attempt. The store
        // starts the TTL when it applies the write, never earlier than this.
        let mut last_renewal: Option<Instant> = None;

        while !cancel.is_cancelled() {
            if !state_tx.borrow().is_leader() {
                state_tx.send_replace(LeadershipState::Transitioning);
            }

            let attempt_started = Instant::now();
            let result = {
                let attempt = self.elections.set_or_renew(&self.name, &self.candidate, self.config.ttl_secs);
                tokio::pin!(attempt);
                tokio::select! {
                    result = &mut attempt => result,
                    _ = lease_lapse(self.lease_deadline(last_renewal)) => {
                        self.lapse(&state_tx, &mut last_renewal);
                        attempt.await
                    }
                }
            };

            let pause = match result {
                Ok(outcome) => {
                    if outcome.is_new_term() {
                        info!(election = %self.name, candidate = %self.candidate, "acquired leadership");
                    }
                    last_renewal = Some(attempt_started);
                    state_tx.send_replace(LeadershipState::Leader {
                        modified_index: outcome.modified_index(),
                    });
                    renew_interval
                }
                Err(CoordinationError::NotLeader { .. }) => {
                    if last_renewal.take().is_some() {
                        warn!(election = %self.name, candidate = %self.candidate, "leadership lost to another candidate");
                    }
                    state_tx.send_replace(LeadershipState::Follower);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.await_vacancy(retry_delay) => {}
                    }
                    continue;
                }
                Err(e) => {
                    warn!(election = %self.name, candidate = %self.candidate, error = %e, "election error");
                    let lapsed = last_renewal.is_none_or(|at| {
                        verified::is_lease_lapsed(at.elapsed().as_millis() as u64, self.config.ttl_secs)
                    });
                    if lapsed {
                        self.lapse(&state_tx, &mut last_renewal);
                    }
                    retry_delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
                _ = lease_lapse(self.lease_deadline(last_renewal)) => self.lapse(&state_tx, &mut last_renewal),
            }
        }

        if state_tx.borrow().is_leader() {
            debug!(election = %self.name, candidate = %self.candidate, "stepping down from leadership");
            if let Err(e) = self.elections.delete(&self.name, &self.candidate).await {
                warn!(election = %self.name, error = %e, "error resigning leadership");
            }
        }
        state_tx.send_replace(LeadershipState::Follower);
    }

    /// Instant after which the store may have expired our claim.
    fn lease_deadline(&self, last_renewal: Option<Instant>) -> Option<Instant> {
        last_renewal.map(|at| at + Duration::from_secs(self.config.ttl_secs))
    }

    /// Stop reporting leadership: the term may be over in the store.
    fn lapse(&self, state_tx: &watch::Sender<LeadershipState>, last_renewal: &mut Option<Instant>) {
        if last_renewal.take().is_some() {
            warn!(election = %self.name, candidate = %self.candidate, "leadership lease lapsed without renewal");
        }
        state_tx.send_replace(LeadershipState::Follower);
    }

    /// Wait until the current record is removed, or one wait bound passes.
    async fn await_vacancy(&self, retry_delay: Duration) {
        let since = match self.elections.record(&self.name).await {
            Ok(Some(record)) => record.modified_index.saturating_add(1),
            // Vacant already.
            Ok(None) => return,
            Err(e) => {
                warn!(election = %self.name, error = %e, "failed to read election record");
                tokio::time::sleep(retry_delay).await;
                return;
            }
        };
        match self.elections.wait_for_vacancy(&self.name, since, self.elections.wait_timeout_ms()).await {
            Ok(true) => debug!(election = %self.name, "election vacated"),
            // Renewed by the leader, or the wait timed out; the caller re-checks.
            Ok(false) => {}
            Err(e) => {
                warn!(election = %self.name, error = %e, "election wait failed");
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}

/// Resolves at the lease deadline; never if there is no lease.
async fn lease_lapse(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle for managing an ongoing campaign.
pub struct ElectionHandle {
    state_rx: watch::Receiver<LeadershipState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    candidate: String,
}

impl ElectionHandle {
    /// Get the current leadership state.
    pub fn state(&self) -> LeadershipState {
        *self.state_rx.borrow()
    }

    /// Check if currently the leader.
    pub fn is_leader(&self) -> bool {
        self.state().is_leader()
    }

    /// Subscribe to leadership state changes.
    pub fn subscribe(&self) -> watch::Receiver<LeadershipState> {
        self.state_rx.clone()
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    /// Request graceful stepdown.
    ///
    /// If currently the leader, the campaign resigns and stops. If not the
    /// leader, this is a no-op.
    pub fn stepdown(&self) {
        if self.is_leader() {
            info!(candidate = %self.candidate, "stepdown requested");
            self.cancel.cancel();
        }
    }

    /// Stop campaigning, resigning first if leader.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ElectionHandle {
    fn drop(&mut self) {
        // The task resigns on its own once cancelled.
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use tether_testing::DeterministicKeyValueStore;

    use super::*;

    #[tokio::test]
    async fn test_set_or_renew_then_reject_other_value() {
        let store = DeterministicKeyValueStore::new();
        let elections = ElectionManager::new(store);

        let first = elections.set_or_renew("E", "v1", 10).await.unwrap();
        assert!(first.is_new_term());
        let renewed = elections.set_or_renew("E", "v1", 10).await.unwrap();
        assert!(matches!(renewed, ElectionOutcome::Renewed { .. }));
        assert!(renewed.modified_index() > first.modified_index());

        let err = elections.set_or_renew("E", "v2", 10).await.unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(elections.get("E").await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_delete_semantics() {
        let store = DeterministicKeyValueStore::new();
        let elections = ElectionManager::new(store);

        assert!(!elections.delete("E", "v1").await.unwrap());
        elections.set_or_renew("E", "v1", 10).await.unwrap();
        assert!(matches!(elections.delete("E", "v2").await, Err(CoordinationError::NotLeader { .. })));
        assert!(elections.delete("E", "v1").await.unwrap());
        assert_eq!(elections.get("E").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_start_rejects_bad_timing() {
        let election = LeaderElection::new(DeterministicKeyValueStore::new(), "E", "c1", ElectionConfig {
            ttl_secs: 1,
            renew_interval_ms: 900,
            retry_delay_ms: 10,
        });
        assert!(matches!(election.start().await, Err(CoordinationError::InvalidArgument { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_candidate_becomes_leader() {
        let store = DeterministicKeyValueStore::new();
        let election = LeaderElection::new(store.clone(), "E", "c1", ElectionConfig {
            ttl_secs: 2,
            renew_interval_ms: 500,
            retry_delay_ms: 100,
        });
        let handle = election.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_leader());

        // Renewals keep the term alive past the TTL.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(handle.is_leader());

        handle.stop().await;
        assert_eq!(ElectionManager::new(store).get("E").await.unwrap(), None);
    }
}
