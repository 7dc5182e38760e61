//! End-to-end delivery through the offline request processor: schedule, run, classify,
//! complete the caller's future.

mod common;

use serde_json::json;
use std::sync::Arc;
use tokio_test::{assert_pending, task};

use offline_queue::auth::{AuthManager, AuthProvider};
use offline_queue::config::{QueueConfig, RunnerConfig, StoreConfig};
use offline_queue::models::{IterableRequest, RequestBody, Task};
use offline_queue::network::HttpResponse;
use offline_queue::store::TaskStore;
use offline_queue::test_helpers::{MockBehavior, MockNetworkSession};

use common::{
    immediate_retry_config, insert_raw_task, offline_harness, offline_harness_with_store,
    MutableAuthProvider, RefreshingAuthManager,
};

fn track_event(data_fields: serde_json::Value) -> IterableRequest {
    let mut body = RequestBody::new();
    body.insert("email".to_string(), json!("user@example.com"));
    body.insert("eventName".to_string(), json!("CustomEvent1"));
    body.insert("dataFields".to_string(), data_fields);
    IterableRequest::post("events/track", Some(body))
}

#[tokio::test]
async fn test_offline_event_is_retried_then_delivered() {
    let session = MockNetworkSession::new();
    session.push_transport_error("The Internet connection appears to be offline.");
    let harness = offline_harness(&immediate_retry_config(), session).await;

    let pending = harness
        .processor
        .send_request(track_event(json!({"var1": "val1"})))
        .await
        .unwrap();
    let mut pending = task::spawn(pending);

    // First pass: no connectivity, task stays queued and the caller stays pending
    assert_eq!(harness.processor.runner().run_once().await.unwrap(), 1);
    assert_pending!(pending.poll());
    let queued = harness.only_task().await;
    assert_eq!(queued.attempts, 1);
    assert!(queued.blocking);

    // Second pass: connectivity is back and the server echoes the body
    assert_eq!(harness.processor.runner().run_once().await.unwrap(), 1);
    let value = pending.await.unwrap();
    assert_eq!(value["eventName"], "CustomEvent1");
    assert_eq!(value["dataFields"], json!({"var1": "val1"}));

    assert_eq!(harness.store().count().await.unwrap(), 0);
    assert_eq!(harness.session.request_count(), 2);
    assert_eq!(harness.processor.notifier().pending_count(), 0);
}

#[tokio::test]
async fn test_transport_failure_moves_schedule_into_the_future() {
    let config = QueueConfig {
        store: StoreConfig::in_memory(),
        ..QueueConfig::default()
    };
    let harness = offline_harness(&config, MockNetworkSession::offline()).await;

    let _pending = harness
        .processor
        .send_request(track_event(json!({})))
        .await
        .unwrap();
    let before = Task::now();
    harness.processor.runner().run_once().await.unwrap();

    let queued = harness.only_task().await;
    assert_eq!(queued.attempts, 1);
    assert!(queued.scheduled_at > before);
    // Nothing is ready until the backoff elapses
    assert_eq!(harness.processor.runner().run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unauthorized_without_auth_manager_rejects() {
    let session = MockNetworkSession::new();
    session.push_response(HttpResponse::new(401, json!({"msg": "Invalid API key"}).to_string()));
    let harness = offline_harness(&immediate_retry_config(), session).await;

    let pending = harness
        .processor
        .send_request(track_event(json!({"var1": "val1"})))
        .await
        .unwrap();
    harness.processor.runner().run_once().await.unwrap();

    let error = pending.await.unwrap_err();
    assert_eq!(error.http_status_code, Some(401));
    assert_eq!(error.reason.as_deref(), Some("Invalid API key"));
    assert_eq!(harness.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let session = MockNetworkSession::new();
    session.push_response(HttpResponse::new(400, json!({"msg": "Invalid email"}).to_string()));
    let harness = offline_harness(&immediate_retry_config(), session).await;

    let pending = harness
        .processor
        .send_request(track_event(json!({})))
        .await
        .unwrap();
    harness.processor.runner().run_once().await.unwrap();

    assert_eq!(pending.await.unwrap_err().http_status_code, Some(400));
    assert_eq!(harness.session.request_count(), 1);
    assert_eq!(harness.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_server_error_is_retried_until_success() {
    let session = MockNetworkSession::new();
    session.push_response(HttpResponse::new(503, Vec::new()));
    session.push_response(HttpResponse::new(500, Vec::new()));
    let harness = offline_harness(&immediate_retry_config(), session).await;

    let pending = harness
        .processor
        .send_request(track_event(json!({"n": 1})))
        .await
        .unwrap();
    for _ in 0..3 {
        harness.processor.runner().run_once().await.unwrap();
    }

    assert_eq!(pending.await.unwrap()["dataFields"], json!({"n": 1}));
    assert_eq!(harness.session.request_count(), 3);
}

#[tokio::test]
async fn test_malformed_payload_is_purged() {
    let harness = offline_harness(&immediate_retry_config(), MockNetworkSession::new()).await;
    let task = insert_raw_task(harness.store(), b"\x00\x01 definitely not an envelope").await;
    let pending = harness.processor.notifier().register(&task.id).unwrap();

    harness.processor.runner().run_once().await.unwrap();

    let error = pending.await.unwrap_err();
    assert!(error
        .reason
        .unwrap()
        .starts_with("could not decode stored request"));
    assert_eq!(harness.store().count().await.unwrap(), 0);
    assert_eq!(harness.session.request_count(), 0);
}

#[tokio::test]
async fn test_retry_exhaustion_rejects_caller() {
    let mut config = immediate_retry_config();
    config.runner = RunnerConfig {
        max_attempts: Some(3),
        ..RunnerConfig::default()
    };
    let harness = offline_harness(&config, MockNetworkSession::offline()).await;

    let pending = harness
        .processor
        .send_request(track_event(json!({})))
        .await
        .unwrap();
    for _ in 0..3 {
        harness.processor.runner().run_once().await.unwrap();
    }

    let error = pending.await.unwrap_err();
    assert!(error.reason.unwrap().contains("offline"));
    assert_eq!(harness.session.request_count(), 3);
    assert_eq!(harness.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_auth_refresh_then_retry_with_new_token() {
    let config = immediate_retry_config();
    let session = MockNetworkSession::new();
    session.push(MockBehavior::Respond(HttpResponse::new(
        401,
        json!({"msg": "JWT token is expired"}).to_string(),
    )));

    let provider = MutableAuthProvider::new(
        offline_queue::models::Auth::with_email("user@example.com").with_auth_token("expired-jwt"),
    );
    let manager = RefreshingAuthManager::new(provider.clone());
    let store = TaskStore::connect(&config.store).await.unwrap();
    let harness = offline_harness_with_store(
        store,
        &config,
        session,
        provider.clone() as Arc<dyn AuthProvider>,
        Some(manager.clone() as Arc<dyn AuthManager>),
    );

    let pending = harness
        .processor
        .send_request(track_event(json!({})))
        .await
        .unwrap();
    harness.processor.runner().run_once().await.unwrap();
    assert_eq!(harness.only_task().await.attempts, 1);
    harness.processor.runner().run_once().await.unwrap();

    assert!(pending.await.is_ok());
    let requests = harness.session.requests();
    assert_eq!(requests[0].header("authorization"), Some("Bearer expired-jwt"));
    assert_eq!(requests[1].header("authorization"), Some("Bearer refreshed-jwt"));

    let failures = manager.failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].status, 401);
    assert_eq!(failures[0].failed_token.as_deref(), Some("expired-jwt"));
}
