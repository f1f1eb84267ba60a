//! EtcdClient against a mocked etcd v2 endpoint.

use std::time::Duration;

use serde_json::json;
use tether_client::ClientConfig;
use tether_client::EtcdClient;
use tether_kv_types::Action;
use tether_kv_types::DeleteRequest;
use tether_kv_types::KeyValueStoreError;
use tether_kv_types::ReadRequest;
use tether_kv_types::WatchRequest;
use tether_kv_types::WriteRequest;
use tether_traits::KeyValueStore;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_string_contains;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;

fn client_for(server: &MockServer) -> EtcdClient {
    EtcdClient::new(&ClientConfig {
        endpoint: server.uri(),
        request_timeout_ms: 2_000,
        watch_timeout_ms: 200,
    })
    .unwrap()
}

#[tokio::test]
async fn create_only_sends_prev_exist_and_reads_index_header() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/keys/elections/e"))
        .and(body_string_contains("prevExist=false"))
        .and(body_string_contains("ttl=10"))
        .respond_with(ResponseTemplate::new(201).insert_header("X-Etcd-Index", "7").set_body_json(json!({
            "action": "create",
            "node": {"key": "/elections/e", "value": "v1", "modifiedIndex": 7, "createdIndex": 7, "ttl": 10}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client_for(&server).write(WriteRequest::create_only("elections/e", "v1", Some(10))).await.unwrap();
    assert_eq!(resp.action, Action::Create);
    assert_eq!(resp.etcd_index, 7);
    assert_eq!(resp.node.ttl, Some(10));
}

#[tokio::test]
async fn compare_failed_maps_to_precondition_failed() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/keys/elections/e"))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({
            "errorCode": 101,
            "message": "Compare failed",
            "cause": "[v2 != v1]",
            "index": 8
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .write(WriteRequest::compare_value_and_swap("/elections/e", "v2", "v2", Some(10)))
        .await
        .unwrap_err();
    assert_eq!(err, KeyValueStoreError::PreconditionFailed {
        key: "/elections/e".into(),
        cause: "[v2 != v1]".into()
    });
}

#[tokio::test]
async fn in_order_create_posts_to_directory() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/keys/locks/L"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "action": "create",
            "node": {"key": "/locks/L/00000000000000000012", "value": "", "modifiedIndex": 12, "createdIndex": 12, "ttl": 10}
        })))
        .mount(&server)
        .await;

    let resp = client_for(&server).write(WriteRequest::create_in_order("/locks/L", "", Some(10))).await.unwrap();
    assert_eq!(resp.node.name(), "00000000000000000012");
    // No header: falls back to the node index.
    assert_eq!(resp.etcd_index, 12);
}

#[tokio::test]
async fn sorted_listing_and_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/locks/L"))
        .and(query_param("sorted", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "get",
            "node": {"key": "/locks/L", "dir": true, "modifiedIndex": 3, "createdIndex": 3, "nodes": [
                {"key": "/locks/L/00000000000000000004", "value": "", "modifiedIndex": 4, "createdIndex": 4}
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "errorCode": 100, "message": "Key not found", "cause": "/missing", "index": 4
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let listing = client.read(ReadRequest::sorted_listing("/locks/L")).await.unwrap();
    assert_eq!(listing.node.leaves_by_creation().len(), 1);

    let err = client.read(ReadRequest::new("/missing")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_with_prev_value_is_compare_and_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/keys/elections/e"))
        .and(query_param("prevValue", "v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "compareAndDelete",
            "node": {"key": "/elections/e", "modifiedIndex": 9, "createdIndex": 7},
            "prevNode": {"key": "/elections/e", "value": "v1", "modifiedIndex": 8, "createdIndex": 7}
        })))
        .mount(&server)
        .await;

    let resp = client_for(&server).delete(DeleteRequest::compare_and_delete("/elections/e", "v1")).await.unwrap();
    assert_eq!(resp.action, Action::CompareAndDelete);
    assert_eq!(resp.prev_node.unwrap().value.as_deref(), Some("v1"));
}

#[tokio::test]
async fn watch_passes_wait_index_and_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/locks/L/00000000000000000004"))
        .and(query_param("wait", "true"))
        .and(query_param("waitIndex", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "delete",
            "node": {"key": "/locks/L/00000000000000000004", "modifiedIndex": 6, "createdIndex": 4}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/quiet"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let event = client.watch(WatchRequest::new("/locks/L/00000000000000000004").since(5)).await.unwrap();
    assert!(event.action.is_removal());

    let err = client.watch(WatchRequest::new("/quiet").with_timeout_ms(100)).await.unwrap_err();
    assert_eq!(err, KeyValueStoreError::Timeout { duration_ms: 100 });
}

#[tokio::test]
async fn cleared_history_reports_oldest_index() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/keys/k"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errorCode": 401,
            "message": "The event in requested index is outdated and cleared",
            "cause": "the requested history has been cleared [1008/8]",
            "index": 2007
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).watch(WatchRequest::new("/k").since(8)).await.unwrap_err();
    assert_eq!(err, KeyValueStoreError::EventIndexCleared {
        requested: 8,
        oldest: 1008
    });
    assert!(err.is_transient());
}

#[tokio::test]
async fn unreachable_endpoint_is_unavailable() {
    // Bind then drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = EtcdClient::new(&ClientConfig {
        endpoint: format!("http://127.0.0.1:{port}"),
        ..ClientConfig::default()
    })
    .unwrap();
    let err = client.read(ReadRequest::new("/k")).await.unwrap_err();
    assert!(matches!(err, KeyValueStoreError::Unavailable { .. }), "{err:?}");
}

#[tokio::test]
async fn server_error_without_body_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("leader lost"))
        .mount(&server)
        .await;

    let err = client_for(&server).read(ReadRequest::new("/k")).await.unwrap_err();
    assert!(err.is_transient());
}
