//! Shared harness for offline queue integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use offline_queue::auth::{
    AuthFailure, AuthHandle, AuthManager, AuthProvider, AuthRefreshDecision,
};
use offline_queue::config::{BackoffConfig, QueueConfig, StoreConfig};
use offline_queue::models::{Auth, Task, TaskType};
use offline_queue::orchestration::{OfflineRequestProcessor, RequestProcessorDependencies};
use offline_queue::store::TaskStore;
use offline_queue::test_helpers::{sample_device, MockNetworkSession};

/// Auth provider whose token can be swapped during a test
pub struct MutableAuthProvider {
    auth: Mutex<Auth>,
}

impl MutableAuthProvider {
    pub fn new(auth: Auth) -> Arc<Self> {
        Arc::new(Self {
            auth: Mutex::new(auth),
        })
    }

    pub fn set_token(&self, token: &str) {
        self.auth.lock().auth_token = Some(token.to_string());
    }
}

impl AuthProvider for MutableAuthProvider {
    fn auth(&self) -> Auth {
        self.auth.lock().clone()
    }
}

/// Auth manager that refreshes the provider's token and asks for a retry
pub struct RefreshingAuthManager {
    provider: Arc<MutableAuthProvider>,
    pub failures: Mutex<Vec<AuthFailure>>,
}

impl RefreshingAuthManager {
    pub fn new(provider: Arc<MutableAuthProvider>) -> Arc<Self> {
        Arc::new(Self {
            provider,
            failures: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AuthManager for RefreshingAuthManager {
    async fn handle_auth_failure(&self, failure: &AuthFailure) -> AuthRefreshDecision {
        self.failures.lock().push(failure.clone());
        self.provider.set_token("refreshed-jwt");
        AuthRefreshDecision::RetryAfterRefresh
    }
}

/// Everything an offline test needs; keeps the SDK-owned collaborators alive
pub struct OfflineHarness {
    pub processor: OfflineRequestProcessor,
    pub session: Arc<MockNetworkSession>,
    pub provider: Arc<dyn AuthProvider>,
    pub manager: Option<Arc<dyn AuthManager>>,
}

impl OfflineHarness {
    pub fn store(&self) -> &TaskStore {
        self.processor.store()
    }

    pub async fn only_task(&self) -> Task {
        let tasks = self.store().all_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1, "expected exactly one queued task");
        tasks.into_iter().next().unwrap()
    }
}

/// Retries are ready on the very next pass
pub fn immediate_retry_config() -> QueueConfig {
    let mut config = QueueConfig {
        store: StoreConfig::in_memory(),
        backoff: BackoffConfig {
            base_delay_ms: 0,
            jitter_factor: 0.0,
            ..BackoffConfig::default()
        },
        ..QueueConfig::default()
    };
    config.network.auth_retry_delay_ms = 0;
    config
}

pub fn user_provider() -> Arc<dyn AuthProvider> {
    Arc::new(offline_queue::auth::StaticAuthProvider::new(Auth::with_email(
        "user@example.com",
    )))
}

pub fn dependencies(
    session: &Arc<MockNetworkSession>,
    provider: &Arc<dyn AuthProvider>,
    manager: Option<&Arc<dyn AuthManager>>,
) -> RequestProcessorDependencies {
    RequestProcessorDependencies {
        api_key: "zee-api-key".to_string(),
        device_metadata: sample_device(),
        auth_provider: AuthHandle::new(provider, "auth provider"),
        auth_manager: manager.map(|manager| AuthHandle::new(manager, "auth manager")),
        network_session: session.clone(),
    }
}

pub async fn offline_harness(config: &QueueConfig, session: MockNetworkSession) -> OfflineHarness {
    let store = TaskStore::connect(&config.store).await.unwrap();
    offline_harness_with_store(store, config, session, user_provider(), None)
}

pub fn offline_harness_with_store(
    store: TaskStore,
    config: &QueueConfig,
    session: MockNetworkSession,
    provider: Arc<dyn AuthProvider>,
    manager: Option<Arc<dyn AuthManager>>,
) -> OfflineHarness {
    let session = Arc::new(session);
    let deps = dependencies(&session, &provider, manager.as_ref());
    OfflineHarness {
        processor: OfflineRequestProcessor::with_store(store, config, &deps),
        session,
        provider,
        manager,
    }
}

/// Insert a raw task, bypassing the scheduler
pub async fn insert_raw_task(store: &TaskStore, data: &[u8]) -> Task {
    let task = Task::new(TaskType::ApiCall, data.to_vec(), Task::now());
    let mut context = store.context().await.unwrap();
    context.create(&task).await.unwrap();
    context.save().await.unwrap();
    task
}
