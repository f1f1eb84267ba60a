//! Deterministic in-memory implementation of [`KeyValueStore`].
//!
//! Mirrors the etcd v2 keys API closely enough for the coordination engines to
//! be tested without a server:
//!
//! - a global index stamped on every mutation,
//! - implicit parent directories and leaf/directory exclusivity,
//! - TTL expiry producing `expire` events,
//! - a bounded event history replayed by `watch` with an explicit index,
//! - in-order keys named by the zero-padded creation index.
//!
//! Time comes from `tokio::time`, so tests running with a paused clock can
//! advance through TTLs instantly.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_constants::api::EVENT_HISTORY_SIZE;
use tether_constants::network::DEFAULT_WATCH_TIMEOUT_MS;
use tether_kv_types::Action;
use tether_kv_types::DeleteRequest;
use tether_kv_types::KeyValueStoreError;
use tether_kv_types::NodeResponse;
use tether_kv_types::NodeState;
use tether_kv_types::ReadRequest;
use tether_kv_types::WatchRequest;
use tether_kv_types::WriteCommand;
use tether_kv_types::WriteRequest;
use tether_kv_types::in_order_key_name;
use tether_kv_types::join_key;
use tether_kv_types::parent_key;
use tether_kv_types::validate_key;
use tether_kv_types::validate_write_command;
use tether_traits::KeyValueStore;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

/// A stored node. `value == None` marks a directory.
#[derive(Clone)]
struct Entry {
    value: Option<String>,
    created_index: u64,
    modified_index: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_dir(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Default)]
struct StoreState {
    index: u64,
    nodes: BTreeMap<String, Entry>,
    history: VecDeque<NodeResponse>,
    /// Highest event index evicted from `history`.
    evicted_through: u64,
}

impl StoreState {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    fn record(&mut self, event: NodeResponse) {
        self.history.push_back(event);
        while self.history.len() > EVENT_HISTORY_SIZE as usize {
            if let Some(old) = self.history.pop_front() {
                self.evicted_through = old.event_index();
            }
        }
    }

    fn node_state(&self, key: &str, entry: &Entry, now: Instant) -> NodeState {
        NodeState {
            key: key.to_string(),
            value: entry.value.clone(),
            created_index: entry.created_index,
            modified_index: entry.modified_index,
            ttl: entry.expires_at.map(|at| remaining_secs(at, now)),
            expiration: None,
            is_directory: entry.is_dir(),
            children: Vec::new(),
        }
    }

    /// Keys strictly beneath `dir`, in key order.
    fn descendants(&self, dir: &str) -> Vec<String> {
        let prefix = if dir == "/" { "/".to_string() } else { format!("{}/", dir) };
        self.nodes.range(prefix.clone()..).take_while(|(k, _)| k.starts_with(&prefix)).map(|(k, _)| k.clone()).collect()
    }

    fn direct_children(&self, dir: &str) -> Vec<String> {
        let depth = if dir == "/" { 1 } else { dir.matches('/').count() + 1 };
        self.descendants(dir).into_iter().filter(|k| k.matches('/').count() == depth).collect()
    }

    fn build_node(&self, key: &str, entry: &Entry, recursive: bool, now: Instant) -> NodeState {
        let mut node = self.node_state(key, entry, now);
        if entry.is_dir() {
            node.children = self
                .direct_children(key)
                .iter()
                .filter_map(|child| {
                    let child_entry = self.nodes.get(child)?;
                    let mut child_node = self.node_state(child, child_entry, now);
                    if recursive && child_entry.is_dir() {
                        child_node = self.build_node(child, child_entry, true, now);
                    }
                    Some(child_node)
                })
                .collect();
        }
        node
    }

    fn root_node(&self, recursive: bool, now: Instant) -> NodeState {
        let root = Entry {
            value: None,
            created_index: 0,
            modified_index: 0,
            expires_at: None,
        };
        self.build_node("/", &root, recursive, now)
    }

    /// Create missing ancestors of `key` as directories stamped with `index`.
    ///
    /// Nothing is inserted if any ancestor is a leaf.
    fn ensure_parents(&mut self, key: &str, index: u64) -> Result<(), KeyValueStoreError> {
        let mut missing = Vec::new();
        let mut cursor = parent_key(key);
        while let Some(parent) = cursor.filter(|p| p != "/") {
            match self.nodes.get(&parent) {
                Some(entry) if !entry.is_dir() => {
                    return Err(KeyValueStoreError::NotADirectory { key: parent });
                }
                Some(_) => {}
                None => missing.push(parent.clone()),
            }
            cursor = parent_key(&parent);
        }
        for dir in missing {
            self.nodes.insert(dir, Entry {
                value: None,
                created_index: index,
                modified_index: index,
                expires_at: None,
            });
        }
        Ok(())
    }

    /// Remove `key` and everything beneath it.
    fn remove_subtree(&mut self, key: &str) {
        for child in self.descendants(key) {
            self.nodes.remove(&child);
        }
        self.nodes.remove(key);
    }

    /// Delete every node whose TTL has elapsed, recording `expire` events.
    fn purge_expired(&mut self, now: Instant) -> bool {
        let mut expired: Vec<(Instant, String)> = self
            .nodes
            .iter()
            .filter_map(|(k, e)| e.expires_at.filter(|at| *at <= now).map(|at| (at, k.clone())))
            .collect();
        if expired.is_empty() {
            return false;
        }
        expired.sort();
        for (_, key) in expired {
            // May already be gone with an expired ancestor.
            let Some(entry) = self.nodes.get(&key).cloned() else {
                continue;
            };
            let index = self.next_index();
            let prev = self.node_state(&key, &entry, now);
            self.remove_subtree(&key);
            trace!(key = %key, index, "key expired");
            self.record(NodeResponse {
                action: Action::Expire,
                node: NodeState {
                    key: key.clone(),
                    created_index: entry.created_index,
                    modified_index: index,
                    is_directory: entry.is_dir(),
                    ..Default::default()
                },
                prev_node: Some(prev),
                etcd_index: index,
            });
        }
        true
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.nodes.values().filter_map(|e| e.expires_at).min()
    }

    /// Insert or overwrite a leaf, returning the event.
    fn put_leaf(
        &mut self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
        action: Action,
        now: Instant,
    ) -> Result<NodeResponse, KeyValueStoreError> {
        let previous = self.nodes.get(key).cloned();
        self.ensure_parents(key, self.index + 1)?;
        let index = self.next_index();
        let entry = Entry {
            value: Some(value.to_string()),
            created_index: match (&previous, action) {
                (Some(prev), Action::Set | Action::Update | Action::CompareAndSwap) => prev.created_index,
                _ => index,
            },
            modified_index: index,
            expires_at: ttl_seconds.map(|ttl| now + Duration::from_secs(ttl)),
        };
        let prev_node = previous.map(|prev| self.node_state(key, &prev, now));
        let node = self.node_state(key, &entry, now);
        self.nodes.insert(key.to_string(), entry);
        let event = NodeResponse {
            action,
            node,
            prev_node,
            etcd_index: index,
        };
        self.record(event.clone());
        Ok(event)
    }
}

fn remaining_secs(at: Instant, now: Instant) -> i64 {
    let remaining = at.saturating_duration_since(now);
    remaining.as_millis().div_ceil(1000) as i64
}

fn compare_cause(
    prev_value: Option<&str>,
    prev_index: Option<u64>,
    entry: &Entry,
) -> Option<String> {
    let mut causes = Vec::new();
    if let Some(expected) = prev_value
        && entry.value.as_deref() != Some(expected)
    {
        causes.push(format!("[{} != {}]", expected, entry.value.as_deref().unwrap_or("")));
    }
    if let Some(expected) = prev_index
        && entry.modified_index != expected
    {
        causes.push(format!("[{} != {}]", expected, entry.modified_index));
    }
    if causes.is_empty() { None } else { Some(causes.join(" ")) }
}

/// True if an event on `event_key` is visible to a watch on `watch_key`.
fn event_matches(event: &NodeResponse, watch_key: &str, recursive: bool) -> bool {
    let event_key = event.node.key.as_str();
    if event_key == watch_key {
        return true;
    }
    let under = |ancestor: &str, key: &str| ancestor == "/" || key.starts_with(&format!("{}/", ancestor));
    // Removing a directory removes everything beneath it.
    if event.action.is_removal() && event.node.is_directory && under(event_key, watch_key) {
        return true;
    }
    recursive && under(watch_key, event_key)
}

/// In-memory deterministic implementation of [`KeyValueStore`] for testing.
///
/// Thread-safe; every operation is applied atomically under one lock, so
/// CAS and CAD are linearizable exactly as the coordination engines require.
pub struct DeterministicKeyValueStore {
    state: Mutex<StoreState>,
    index_tx: watch::Sender<u64>,
    watch_timeout: Duration,
}

impl Default for DeterministicKeyValueStore {
    fn default() -> Self {
        Self::new_inner(Duration::from_millis(DEFAULT_WATCH_TIMEOUT_MS))
    }
}

impl DeterministicKeyValueStore {
    /// Create a new deterministic store wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a store whose watches time out after `watch_timeout` by default.
    pub fn with_watch_timeout(watch_timeout: Duration) -> Arc<Self> {
        Arc::new(Self::new_inner(watch_timeout))
    }

    fn new_inner(watch_timeout: Duration) -> Self {
        let (index_tx, _) = watch::channel(0);
        Self {
            state: Mutex::new(StoreState::default()),
            index_tx,
            watch_timeout,
        }
    }

    /// Current store index.
    pub async fn current_index(&self) -> u64 {
        self.state.lock().await.index
    }

    /// All live keys (leaves and directories) in key order.
    pub async fn keys(&self) -> Vec<String> {
        let mut state = self.state.lock().await;
        if state.purge_expired(Instant::now()) {
            self.index_tx.send_replace(state.index);
        }
        state.nodes.keys().cloned().collect()
    }

    /// Leaf keys directly beneath `dir`.
    pub async fn children_of(&self, dir: &str) -> Vec<String> {
        let Ok(dir) = validate_key(dir) else {
            return Vec::new();
        };
        let mut state = self.state.lock().await;
        if state.purge_expired(Instant::now()) {
            self.index_tx.send_replace(state.index);
        }
        state.direct_children(&dir).into_iter().filter(|k| state.nodes.get(k).is_some_and(|e| !e.is_dir())).collect()
    }

    fn publish(&self, index: u64) {
        self.index_tx.send_replace(index);
    }

    async fn apply_write(&self, command: WriteCommand) -> Result<NodeResponse, KeyValueStoreError> {
        validate_write_command(&command)?;
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let purged = state.purge_expired(now);
        let result = Self::apply_write_locked(&mut state, command, now);
        if purged || result.is_ok() {
            self.publish(state.index);
        }
        result
    }

    fn apply_write_locked(
        state: &mut StoreState,
        command: WriteCommand,
        now: Instant,
    ) -> Result<NodeResponse, KeyValueStoreError> {
        let key = validate_key(command.key())?;
        match command {
            WriteCommand::Set { value, ttl_seconds, .. } => {
                Self::leaf_slot(state, &key)?;
                state.put_leaf(&key, &value, ttl_seconds, Action::Set, now)
            }
            WriteCommand::CreateOnly { value, ttl_seconds, .. } => {
                if state.nodes.contains_key(&key) || key == "/" {
                    return Err(KeyValueStoreError::PreconditionFailed {
                        key,
                        cause: "key already exists".to_string(),
                    });
                }
                state.put_leaf(&key, &value, ttl_seconds, Action::Create, now)
            }
            WriteCommand::CompareAndSwap {
                value,
                ttl_seconds,
                prev_value,
                prev_exists,
                prev_index,
                ..
            } => {
                if prev_exists == Some(false) {
                    return Self::apply_write_locked(
                        state,
                        WriteCommand::CreateOnly {
                            key,
                            value,
                            ttl_seconds,
                        },
                        now,
                    );
                }
                let Some(entry) = Self::leaf_slot(state, &key)? else {
                    if prev_exists.is_none() && prev_value.is_none() && prev_index.is_none() {
                        return state.put_leaf(&key, &value, ttl_seconds, Action::Set, now);
                    }
                    return Err(KeyValueStoreError::NotFound { key });
                };
                if let Some(cause) = compare_cause(prev_value.as_deref(), prev_index, &entry) {
                    return Err(KeyValueStoreError::PreconditionFailed { key, cause });
                }
                let action = if prev_value.is_none() && prev_index.is_none() {
                    if prev_exists == Some(true) { Action::Update } else { Action::Set }
                } else {
                    Action::CompareAndSwap
                };
                state.put_leaf(&key, &value, ttl_seconds, action, now)
            }
            WriteCommand::CreateInOrder { value, ttl_seconds, .. } => {
                if let Some(entry) = state.nodes.get(&key)
                    && !entry.is_dir()
                {
                    return Err(KeyValueStoreError::NotADirectory { key });
                }
                // The child name is the index the create will be stamped with.
                let child = join_key(&key, &in_order_key_name(state.index + 1));
                state.put_leaf(&child, &value, ttl_seconds, Action::Create, now)
            }
        }
    }

    /// Existing leaf at `key`, rejecting directories.
    fn leaf_slot(state: &StoreState, key: &str) -> Result<Option<Entry>, KeyValueStoreError> {
        if key == "/" {
            return Err(KeyValueStoreError::NotAFile { key: key.to_string() });
        }
        match state.nodes.get(key) {
            Some(entry) if entry.is_dir() => Err(KeyValueStoreError::NotAFile { key: key.to_string() }),
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    fn apply_delete_locked(
        state: &mut StoreState,
        request: DeleteRequest,
        now: Instant,
    ) -> Result<NodeResponse, KeyValueStoreError> {
        let key = validate_key(&request.key)?;
        if key == "/" {
            return Err(KeyValueStoreError::Failed {
                reason: "root is read only".to_string(),
            });
        }
        let Some(entry) = state.nodes.get(&key).cloned() else {
            return Err(KeyValueStoreError::NotFound { key });
        };
        if entry.is_dir() {
            if request.is_conditional() || !(request.dir || request.recursive) {
                return Err(KeyValueStoreError::NotAFile { key });
            }
            if !request.recursive && !state.descendants(&key).is_empty() {
                return Err(KeyValueStoreError::DirectoryNotEmpty { key });
            }
        } else if let Some(cause) = compare_cause(request.prev_value.as_deref(), request.prev_index, &entry) {
            return Err(KeyValueStoreError::PreconditionFailed { key, cause });
        }

        let index = state.next_index();
        let prev_node = state.node_state(&key, &entry, now);
        state.remove_subtree(&key);
        let event = NodeResponse {
            action: if request.is_conditional() {
                Action::CompareAndDelete
            } else {
                Action::Delete
            },
            node: NodeState {
                key,
                created_index: entry.created_index,
                modified_index: index,
                is_directory: entry.is_dir(),
                ..Default::default()
            },
            prev_node: Some(prev_node),
            etcd_index: index,
        };
        state.record(event.clone());
        Ok(event)
    }

    /// First retained event at or after `since` visible to the watch.
    fn find_event(
        state: &StoreState,
        key: &str,
        recursive: bool,
        since: u64,
    ) -> Result<Option<NodeResponse>, KeyValueStoreError> {
        if state.evicted_through > 0 && since <= state.evicted_through {
            return Err(KeyValueStoreError::EventIndexCleared {
                requested: since,
                oldest: state.evicted_through + 1,
            });
        }
        Ok(state
            .history
            .iter()
            .find(|event| event.event_index() >= since && event_matches(event, key, recursive))
            .map(|event| NodeResponse {
                etcd_index: state.index,
                ..event.clone()
            }))
    }
}

#[async_trait]
impl KeyValueStore for DeterministicKeyValueStore {
    async fn read(&self, request: ReadRequest) -> Result<NodeResponse, KeyValueStoreError> {
        let key = validate_key(&request.key)?;
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if state.purge_expired(now) {
            self.publish(state.index);
        }
        let node = if key == "/" {
            state.root_node(request.recursive, now)
        } else {
            let entry = state.nodes.get(&key).cloned().ok_or_else(|| KeyValueStoreError::NotFound { key: key.clone() })?;
            state.build_node(&key, &entry, request.recursive, now)
        };
        Ok(NodeResponse {
            action: Action::Get,
            node,
            prev_node: None,
            etcd_index: state.index,
        })
    }

    async fn write(&self, request: WriteRequest) -> Result<NodeResponse, KeyValueStoreError> {
        self.apply_write(request.command).await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<NodeResponse, KeyValueStoreError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let purged = state.purge_expired(now);
        let result = Self::apply_delete_locked(&mut state, request, now);
        if purged || result.is_ok() {
            self.publish(state.index);
        }
        result
    }

    async fn watch(&self, request: WatchRequest) -> Result<NodeResponse, KeyValueStoreError> {
        let key = validate_key(&request.key)?;
        let timeout = request.timeout_ms.map(Duration::from_millis).unwrap_or(self.watch_timeout);
        let deadline = Instant::now() + timeout;
        // Subscribe before the first check so no mutation can slip between them.
        let mut index_rx = self.index_tx.subscribe();

        let since = match request.wait_index {
            Some(index) => index,
            None => {
                let mut state = self.state.lock().await;
                if state.purge_expired(Instant::now()) {
                    self.publish(state.index);
                }
                state.index + 1
            }
        };

        loop {
            let wake_at = {
                let mut state = self.state.lock().await;
                if state.purge_expired(Instant::now()) {
                    self.publish(state.index);
                }
                if let Some(event) = Self::find_event(&state, &key, request.recursive, since)? {
                    return Ok(event);
                }
                state.next_expiry().map_or(deadline, |at| at.min(deadline))
            };

            if Instant::now() >= deadline {
                return Err(KeyValueStoreError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                });
            }

            tokio::select! {
                changed = index_rx.changed() => {
                    if changed.is_err() {
                        return Err(KeyValueStoreError::Unavailable {
                            reason: "store dropped".to_string(),
                        });
                    }
                }
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_and_indices() {
        let store = DeterministicKeyValueStore::new();
        let first = store.write(WriteRequest::set("/a/b", "1")).await.unwrap();
        assert_eq!(first.action, Action::Set);
        assert_eq!(first.node.created_index, 1);
        assert!(first.prev_node.is_none());

        let second = store.write(WriteRequest::set("/a/b", "2")).await.unwrap();
        assert_eq!(second.node.created_index, 1);
        assert_eq!(second.node.modified_index, 2);
        assert_eq!(second.prev_node.unwrap().value.as_deref(), Some("1"));

        let dir = store.read(ReadRequest::new("/a")).await.unwrap();
        assert!(dir.node.is_directory);
        assert_eq!(dir.node.children.len(), 1);
        assert_eq!(dir.node.children[0].value.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn leaf_and_directory_are_exclusive() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("/a", "leaf")).await.unwrap();
        let err = store.write(WriteRequest::set("/a/b", "x")).await.unwrap_err();
        assert!(matches!(err, KeyValueStoreError::NotADirectory { .. }));

        store.write(WriteRequest::set("/d/x", "1")).await.unwrap();
        let err = store.write(WriteRequest::set("/d", "x")).await.unwrap_err();
        assert!(matches!(err, KeyValueStoreError::NotAFile { .. }));
    }

    #[tokio::test]
    async fn create_only_and_cas_conditions() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::create_only("/e", "v1", None)).await.unwrap();
        let err = store.write(WriteRequest::create_only("/e", "v2", None)).await.unwrap_err();
        assert!(err.is_precondition_failed());

        let err = store.write(WriteRequest::compare_value_and_swap("/e", "v3", "v2", None)).await.unwrap_err();
        assert!(err.is_precondition_failed());

        let ok = store.write(WriteRequest::compare_value_and_swap("/e", "v3", "v1", None)).await.unwrap();
        assert_eq!(ok.action, Action::CompareAndSwap);

        let stale = store.write(WriteRequest::compare_index_and_swap("/e", "v4", 1, None)).await.unwrap_err();
        assert!(stale.is_precondition_failed());

        let missing = store.write(WriteRequest::compare_value_and_swap("/nope", "v", "x", None)).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn delete_semantics() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("/d/x", "1")).await.unwrap();

        let err = store.delete(DeleteRequest::new("/d")).await.unwrap_err();
        assert!(matches!(err, KeyValueStoreError::NotAFile { .. }));
        let err = store.delete(DeleteRequest::new("/d").directory()).await.unwrap_err();
        assert!(matches!(err, KeyValueStoreError::DirectoryNotEmpty { .. }));

        let err = store.delete(DeleteRequest::compare_and_delete("/d/x", "2")).await.unwrap_err();
        assert!(err.is_precondition_failed());
        let cad = store.delete(DeleteRequest::compare_and_delete("/d/x", "1")).await.unwrap();
        assert_eq!(cad.action, Action::CompareAndDelete);

        store.delete(DeleteRequest::new("/d").directory()).await.unwrap();
        let err = store.read(ReadRequest::new("/d")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn in_order_keys_follow_index() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("/other", "x")).await.unwrap();
        let a = store.write(WriteRequest::create_in_order("/q", "a", None)).await.unwrap();
        let b = store.write(WriteRequest::create_in_order("/q", "b", None)).await.unwrap();
        assert_eq!(a.node.key, format!("/q/{}", in_order_key_name(2)));
        assert_eq!(a.node.created_index, 2);
        assert!(b.node.key > a.node.key);
        assert_eq!(store.children_of("/q").await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_removes_key_and_emits_event() {
        let store = DeterministicKeyValueStore::new();
        let created = store.write(WriteRequest::set_with_ttl("/t", "v", 10)).await.unwrap();
        assert_eq!(created.node.ttl, Some(10));

        let watcher = {
            let store = store.clone();
            tokio::spawn(async move { store.watch(WatchRequest::new("/t").since(created.node.modified_index + 1)).await })
        };

        tokio::time::advance(Duration::from_secs(11)).await;
        let event = watcher.await.unwrap().unwrap();
        assert_eq!(event.action, Action::Expire);
        assert_eq!(event.prev_node.unwrap().value.as_deref(), Some("v"));
        assert!(store.read(ReadRequest::new("/t")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn watch_replays_history_from_index() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("/w", "1")).await.unwrap();
        store.write(WriteRequest::set("/w", "2")).await.unwrap();

        let event = store.watch(WatchRequest::new("/w").since(2)).await.unwrap();
        assert_eq!(event.node.value.as_deref(), Some("2"));
        assert_eq!(event.etcd_index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn watch_times_out() {
        let store = DeterministicKeyValueStore::new();
        let err = store.watch(WatchRequest::new("/quiet").with_timeout_ms(250)).await.unwrap_err();
        assert_eq!(err, KeyValueStoreError::Timeout { duration_ms: 250 });
    }

    #[tokio::test]
    async fn recursive_watch_sees_children_and_directory_delete_reaches_child_watch() {
        let store = DeterministicKeyValueStore::new();
        store.write(WriteRequest::set("/r/a", "1")).await.unwrap();
        let start = store.current_index().await + 1;

        store.write(WriteRequest::set("/r/b", "2")).await.unwrap();
        let event = store.watch(WatchRequest::new("/r").recursive().since(start)).await.unwrap();
        assert_eq!(event.node.key, "/r/b");

        let before_delete = store.current_index().await + 1;
        store.delete(DeleteRequest::new("/r").recursive()).await.unwrap();
        let event = store.watch(WatchRequest::new("/r/a").since(before_delete)).await.unwrap();
        assert_eq!(event.action, Action::Delete);
        assert_eq!(event.node.key, "/r");
    }

    #[tokio::test]
    async fn history_eviction_reports_cleared_index() {
        let store = DeterministicKeyValueStore::new();
        for i in 0..(EVENT_HISTORY_SIZE + 5) {
            store.write(WriteRequest::set("/h", i.to_string())).await.unwrap();
        }
        let err = store.watch(WatchRequest::new("/h").since(1)).await.unwrap_err();
        assert!(matches!(err, KeyValueStoreError::EventIndexCleared { requested: 1, oldest: 6 }));
    }
}
