//! Fault injection around any `KeyValueStore`.
//!
//! Injected errors are returned before the request reaches the inner store,
//! so a failed call has no effect. Response latency is added after the inner
//! store applied the request, modelling a slow reply to a write that already
//! happened.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_kv_types::DeleteRequest;
use tether_kv_types::KeyValueStoreError;
use tether_kv_types::NodeResponse;
use tether_kv_types::ReadRequest;
use tether_kv_types::WatchRequest;
use tether_kv_types::WriteRequest;
use tether_traits::KeyValueStore;
use tracing::debug;

/// Store operation a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Read,
    Write,
    Delete,
    Watch,
}

#[derive(Default)]
struct FaultState {
    /// One-shot errors, consumed in order.
    queued: HashMap<StoreOp, VecDeque<KeyValueStoreError>>,
    /// Returned on every call until healed.
    sticky: HashMap<StoreOp, KeyValueStoreError>,
    latency: HashMap<StoreOp, Duration>,
    injected: HashMap<StoreOp, u32>,
}

/// Wraps a store and injects errors or latency per operation.
pub struct FaultyKeyValueStore<S: KeyValueStore + ?Sized> {
    inner: Arc<S>,
    state: Mutex<FaultState>,
}

impl<S: KeyValueStore + ?Sized> FaultyKeyValueStore<S> {
    pub fn new(inner: Arc<S>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            state: Mutex::new(FaultState::default()),
        })
    }

    /// Fail the next call of `op` with `error`. Queued errors are used in order.
    pub fn fail_next(&self, op: StoreOp, error: KeyValueStoreError) {
        self.state.lock().queued.entry(op).or_default().push_back(error);
    }

    /// Fail every call of `op` with `error` until [`heal`](Self::heal).
    pub fn fail_always(&self, op: StoreOp, error: KeyValueStoreError) {
        self.state.lock().sticky.insert(op, error);
    }

    /// Delay every response of `op` by `latency` after the inner store replied.
    pub fn delay_responses(&self, op: StoreOp, latency: Duration) {
        self.state.lock().latency.insert(op, latency);
    }

    /// Remove every fault on `op`.
    pub fn heal(&self, op: StoreOp) {
        let mut state = self.state.lock();
        state.queued.remove(&op);
        state.sticky.remove(&op);
        state.latency.remove(&op);
    }

    /// Number of errors injected into `op` so far.
    pub fn injected(&self, op: StoreOp) -> u32 {
        self.state.lock().injected.get(&op).copied().unwrap_or(0)
    }

    pub fn has_active_faults(&self) -> bool {
        let state = self.state.lock();
        state.queued.values().any(|q| !q.is_empty()) || !state.sticky.is_empty() || !state.latency.is_empty()
    }

    fn take_fault(&self, op: StoreOp) -> Option<KeyValueStoreError> {
        let mut state = self.state.lock();
        let fault = match state.queued.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Some(error),
            None => state.sticky.get(&op).cloned(),
        };
        if fault.is_some() {
            *state.injected.entry(op).or_insert(0) += 1;
        }
        fault
    }

    async fn call(
        &self,
        op: StoreOp,
        inner: impl Future<Output = Result<NodeResponse, KeyValueStoreError>>,
    ) -> Result<NodeResponse, KeyValueStoreError> {
        if let Some(error) = self.take_fault(op) {
            debug!(?op, error = %error, "injected store fault");
            return Err(error);
        }
        let result = inner.await;
        let latency = self.state.lock().latency.get(&op).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for FaultyKeyValueStore<S> {
    async fn read(&self, request: ReadRequest) -> Result<NodeResponse, KeyValueStoreError> {
        self.call(StoreOp::Read, self.inner.read(request)).await
    }

    async fn write(&self, request: WriteRequest) -> Result<NodeResponse, KeyValueStoreError> {
        self.call(StoreOp::Write, self.inner.write(request)).await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<NodeResponse, KeyValueStoreError> {
        self.call(StoreOp::Delete, self.inner.delete(request)).await
    }

    async fn watch(&self, request: WatchRequest) -> Result<NodeResponse, KeyValueStoreError> {
        self.call(StoreOp::Watch, self.inner.watch(request)).await
    }
}
