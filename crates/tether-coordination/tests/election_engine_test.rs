//! Leader election and the background campaign against the deterministic store.

use std::sync::Arc;
use std::time::Duration;

use tether_coordination::CoordinationError;
use tether_coordination::ElectionConfig;
use tether_coordination::ElectionManager;
use tether_coordination::LeaderElection;
use tether_coordination::LeadershipScope;
use tether_coordination::LeadershipState;
use tether_coordination::ScopedGuard;
use tether_kv_types::KeyValueStoreError;
use tether_testing::DeterministicKeyValueStore;
use tether_testing::FaultyKeyValueStore;
use tether_testing::StoreOp;
use tether_testing::init_test_tracing;

fn fast_config() -> ElectionConfig {
    ElectionConfig {
        ttl_secs: 2,
        renew_interval_ms: 500,
        retry_delay_ms: 100,
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_value_rejected_until_term_expires() {
    init_test_tracing();
    let store = DeterministicKeyValueStore::new();
    let elections = ElectionManager::new(store);

    elections.set_or_renew("E", "v1", 10).await.unwrap();
    let err = elections.set_or_renew("E", "v2", 10).await.unwrap_err();
    assert!(err.is_precondition_failed());
    assert_eq!(err, CoordinationError::NotLeader {
        name: "E".into(),
        value: "v2".into()
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(elections.get("E").await.unwrap(), None);

    let outcome = elections.set_or_renew("E", "v2", 10).await.unwrap();
    assert!(outcome.is_new_term());
}

#[tokio::test(start_paused = true)]
async fn test_former_leader_cannot_delete_new_claim() {
    let store = DeterministicKeyValueStore::new();
    let elections = ElectionManager::new(store);

    elections.set_or_renew("E", "v1", 1).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    elections.set_or_renew("E", "v2", 10).await.unwrap();

    assert!(elections.delete("E", "v1").await.unwrap_err().is_ownership_lost());
    assert_eq!(elections.get("E").await.unwrap().as_deref(), Some("v2"));
}

#[tokio::test(start_paused = true)]
async fn test_follower_takes_over_after_leader_stops() {
    init_test_tracing();
    let store = DeterministicKeyValueStore::new();

    let first = LeaderElection::new(store.clone(), "E", "c1", fast_config()).start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(first.is_leader());

    let second = LeaderElection::new(store.clone(), "E", "c2", fast_config()).start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(first.is_leader());
    assert_eq!(second.state(), LeadershipState::Follower);

    let mut changes = second.subscribe();
    first.stop().await;
    tokio::time::timeout(Duration::from_secs(5), changes.wait_for(|state| state.is_leader()))
        .await
        .expect("follower never took over")
        .unwrap();

    let elections = ElectionManager::new(store);
    assert_eq!(elections.get("E").await.unwrap().as_deref(), Some("c2"));
    second.stop().await;
    assert_eq!(elections.get("E").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_stepdown_is_noop_for_follower() {
    let store = DeterministicKeyValueStore::new();
    let elections = ElectionManager::new(store.clone());
    elections.set_or_renew("E", "other", 60).await.unwrap();

    let handle = LeaderElection::new(store, "E", "c1", fast_config()).start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_leader());
    handle.stepdown();
    assert_eq!(handle.candidate(), "c1");
    handle.stop().await;
    assert_eq!(elections.get("E").await.unwrap().as_deref(), Some("other"));
}

#[tokio::test]
async fn test_leadership_guard_resigns() {
    let store = DeterministicKeyValueStore::new();
    let elections = Arc::new(ElectionManager::new(store));
    let scope = Arc::new(LeadershipScope::new(elections.clone(), "E", "v1", 30));

    let guard = ScopedGuard::acquire(scope.clone()).await.unwrap();
    assert_eq!(guard.token().map(|t| t.value.as_str()), Some("v1"));

    let rival = Arc::new(LeadershipScope::new(elections.clone(), "E", "v2", 30));
    assert!(matches!(ScopedGuard::acquire(rival).await, Err(CoordinationError::NotLeader { .. })));

    guard.release().await.unwrap();
    assert_eq!(elections.get("E").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_slow_renewals_never_report_two_leaders() {
    init_test_tracing();
    let inner = DeterministicKeyValueStore::new();
    let slow = FaultyKeyValueStore::new(inner.clone());
    // Writes land at once; the reply takes most of the TTL.
    slow.delay_responses(StoreOp::Write, Duration::from_millis(1500));

    let first = LeaderElection::new(slow.clone(), "E", "c1", fast_config()).start().await.unwrap();
    first.subscribe().wait_for(|state| state.is_leader()).await.unwrap();
    slow.fail_always(StoreOp::Write, KeyValueStoreError::Unavailable {
        reason: "connection reset".to_string(),
    });

    let rival = LeaderElection::new(inner.clone(), "E", "c2", fast_config()).start().await.unwrap();
    // Sample off the timer grid so no sample shares an instant with a renewal.
    tokio::time::sleep(Duration::from_millis(25)).await;
    let mut rival_led = false;
    for step in 0..100 {
        assert!(!(first.is_leader() && rival.is_leader()), "two leaders at step {step}");
        rival_led |= rival.is_leader();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(rival_led);
    assert!(!first.is_leader());
    assert_eq!(ElectionManager::new(inner).get("E").await.unwrap().as_deref(), Some("c2"));
    first.stop().await;
    rival.stop().await;
}
