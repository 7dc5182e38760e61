//! # Request Processors
//!
//! The SDK-facing entry point. Each call builds an [`ApiCallRequest`] envelope for the
//! current user and returns a [`PendingResult`] that resolves once the server has answered.
//!
//! - [`OfflineRequestProcessor`] persists every request as a task and lets the
//!   [`TaskRunner`] deliver it, surviving restarts and connectivity loss.
//! - [`OnlineRequestProcessor`] sends immediately with no persistence; any failure,
//!   retryable or not, rejects the caller.
//!
//! [`RequestProcessor`] picks one variant at construction time from
//! [`ProcessorMode`].

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::auth::{AuthManagerHandle, AuthProviderHandle};
use crate::config::{ProcessorMode, QueueConfig};
use crate::constants::headers;
use crate::error::{QueueError, Result};
use crate::models::{
    ApiCallRequest, Auth, DeviceMetadata, IterableRequest, RequestBody, RequestCreator,
    SendRequestError, Task, TaskResult,
};
use crate::network::NetworkSession;
use crate::orchestration::api_call_processor::ApiCallTaskProcessor;
use crate::orchestration::completion_notifier::{CompletionNotifier, PendingResult};
use crate::orchestration::task_runner::TaskRunner;
use crate::orchestration::task_scheduler::{ScheduleOptions, TaskScheduler};
use crate::store::TaskStore;

/// Collaborators owned by the SDK
#[derive(Clone)]
pub struct RequestProcessorDependencies {
    pub api_key: String,
    pub device_metadata: DeviceMetadata,
    pub auth_provider: AuthProviderHandle,
    pub auth_manager: Option<AuthManagerHandle>,
    pub network_session: Arc<dyn NetworkSession>,
}

/// Builds envelopes and request creators for whoever the auth provider says is current
#[derive(Clone)]
struct EnvelopeFactory {
    api_key: String,
    end_point: String,
    device_metadata: DeviceMetadata,
    auth_provider: AuthProviderHandle,
    sdk_version: String,
}

impl EnvelopeFactory {
    fn new(config: &QueueConfig, deps: &RequestProcessorDependencies) -> Self {
        Self {
            api_key: deps.api_key.clone(),
            end_point: config.network.api_endpoint.clone(),
            device_metadata: deps.device_metadata.clone(),
            auth_provider: deps.auth_provider.clone(),
            sdk_version: config.network.sdk_version.clone(),
        }
    }

    fn auth(&self) -> Result<Auth> {
        Ok(self.auth_provider.upgrade()?.auth())
    }

    fn request_creator(&self) -> Result<RequestCreator> {
        Ok(RequestCreator::new(
            self.auth()?,
            self.device_metadata.clone(),
            self.sdk_version.clone(),
        ))
    }

    fn envelope(&self, request: IterableRequest) -> Result<ApiCallRequest> {
        Ok(ApiCallRequest {
            api_key: self.api_key.clone(),
            end_point: self.end_point.clone(),
            auth: self.auth()?,
            device_metadata: self.device_metadata.clone(),
            iterable_request: request,
        })
    }
}

fn api_call_processor(config: &QueueConfig, deps: &RequestProcessorDependencies) -> ApiCallTaskProcessor {
    let mut processor = ApiCallTaskProcessor::new(deps.network_session.clone(), &config.network)
        .with_auth_provider(deps.auth_provider.clone());
    if let Some(manager) = &deps.auth_manager {
        processor = processor.with_auth_manager(manager.clone());
    }
    processor
}

/// Persists requests and delivers them through the task runner
pub struct OfflineRequestProcessor {
    factory: EnvelopeFactory,
    scheduler: TaskScheduler,
    runner: Arc<TaskRunner>,
    notifier: Arc<CompletionNotifier>,
}

impl OfflineRequestProcessor {
    pub async fn new(config: &QueueConfig, deps: &RequestProcessorDependencies) -> Result<Self> {
        let store = TaskStore::connect(&config.store).await?;
        Ok(Self::with_store(store, config, deps))
    }

    pub fn with_store(store: TaskStore, config: &QueueConfig, deps: &RequestProcessorDependencies) -> Self {
        let notifier = Arc::new(CompletionNotifier::new());
        let runner = TaskRunner::with_publisher(
            store.clone(),
            config.runner.clone(),
            config.backoff.clone(),
            notifier.clone(),
        );
        runner.register_processor(Arc::new(api_call_processor(config, deps)));
        let scheduler = TaskScheduler::new(store, runner.wake_handle());

        Self {
            factory: EnvelopeFactory::new(config, deps),
            scheduler,
            runner: Arc::new(runner),
            notifier,
        }
    }

    pub fn start(&self) {
        self.runner.start();
    }

    pub async fn stop(&self) {
        self.runner.stop().await;
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.runner
    }

    pub fn notifier(&self) -> &Arc<CompletionNotifier> {
        &self.notifier
    }

    pub fn store(&self) -> &TaskStore {
        self.runner.store()
    }

    /// Persist `request` and register for its completion in the same transaction
    #[instrument(skip(self, request), fields(path = request.path()))]
    pub async fn send_request(&self, request: IterableRequest) -> Result<PendingResult> {
        let envelope = self.factory.envelope(request)?;

        let mut pending = None;
        let scheduled = self
            .scheduler
            .schedule_with_hook(&envelope, ScheduleOptions::blocking(), |task_id| {
                pending = Some(self.notifier.register(task_id)?);
                Ok(())
            })
            .await;

        match (scheduled, pending) {
            (Ok(task_id), Some(pending)) => {
                debug!(task_id = %task_id, "Request queued");
                Ok(pending)
            }
            (Ok(task_id), None) => Err(QueueError::illegal_state(format!(
                "task {task_id} scheduled without a pending result"
            ))),
            (Err(e), pending) => {
                if let Some(pending) = pending {
                    self.notifier.discard(pending.task_id());
                }
                Err(e)
            }
        }
    }
}

/// Sends requests immediately with no persistence
pub struct OnlineRequestProcessor {
    factory: EnvelopeFactory,
    processor: Arc<ApiCallTaskProcessor>,
    notifier: Arc<CompletionNotifier>,
}

impl OnlineRequestProcessor {
    pub fn new(config: &QueueConfig, deps: &RequestProcessorDependencies) -> Self {
        Self {
            factory: EnvelopeFactory::new(config, deps),
            processor: Arc::new(api_call_processor(config, deps)),
            notifier: Arc::new(CompletionNotifier::new()),
        }
    }

    #[instrument(skip(self, request), fields(path = request.path()))]
    pub async fn send_request(&self, request: IterableRequest) -> Result<PendingResult> {
        let envelope = self.factory.envelope(request)?;
        let request_id = Task::generate_id();
        let pending = self.notifier.register(&request_id)?;

        let processor = self.processor.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            match processor.execute(&envelope, headers::PROCESSOR_ONLINE).await {
                Ok(TaskResult::Success { detail }) => notifier.resolve(&request_id, detail),
                Ok(TaskResult::FailureWithNoRetry { detail })
                | Ok(TaskResult::FailureWithRetry { detail, .. }) => {
                    notifier.reject(&request_id, detail)
                }
                Err(e) => notifier.reject(&request_id, SendRequestError::from(&e)),
            }
        });

        Ok(pending)
    }
}

/// Request processor selected by [`ProcessorMode`]
pub enum RequestProcessor {
    Online(OnlineRequestProcessor),
    Offline(OfflineRequestProcessor),
}

impl RequestProcessor {
    pub async fn bootstrap(config: &QueueConfig, deps: RequestProcessorDependencies) -> Result<Self> {
        let processor = match config.processor_mode {
            ProcessorMode::Online => RequestProcessor::Online(OnlineRequestProcessor::new(config, &deps)),
            ProcessorMode::Offline => {
                RequestProcessor::Offline(OfflineRequestProcessor::new(config, &deps).await?)
            }
        };
        info!(mode = ?config.processor_mode, "Request processor ready");
        Ok(processor)
    }

    pub fn mode(&self) -> ProcessorMode {
        match self {
            RequestProcessor::Online(_) => ProcessorMode::Online,
            RequestProcessor::Offline(_) => ProcessorMode::Offline,
        }
    }

    pub fn start(&self) {
        if let RequestProcessor::Offline(processor) = self {
            processor.start();
        }
    }

    pub async fn stop(&self) {
        if let RequestProcessor::Offline(processor) = self {
            processor.stop().await;
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            RequestProcessor::Online(_) => true,
            RequestProcessor::Offline(processor) => processor.runner.is_running(),
        }
    }

    pub fn as_offline(&self) -> Option<&OfflineRequestProcessor> {
        match self {
            RequestProcessor::Offline(processor) => Some(processor),
            RequestProcessor::Online(_) => None,
        }
    }

    pub async fn send_request(&self, request: IterableRequest) -> Result<PendingResult> {
        match self {
            RequestProcessor::Online(processor) => processor.send_request(request).await,
            RequestProcessor::Offline(processor) => processor.send_request(request).await,
        }
    }

    pub async fn track_event(
        &self,
        event_name: &str,
        data_fields: Option<RequestBody>,
    ) -> Result<PendingResult> {
        let request = self
            .factory()
            .request_creator()?
            .create_track_event_request(event_name, data_fields)?;
        self.send_request(request).await
    }

    pub async fn update_user(
        &self,
        data_fields: RequestBody,
        merge_nested_objects: bool,
    ) -> Result<PendingResult> {
        let request = self
            .factory()
            .request_creator()?
            .create_update_user_request(data_fields, merge_nested_objects)?;
        self.send_request(request).await
    }

    pub async fn update_email(&self, new_email: &str) -> Result<PendingResult> {
        let request = self
            .factory()
            .request_creator()?
            .create_update_email_request(new_email)?;
        self.send_request(request).await
    }

    pub async fn get_in_app_messages(&self, count: u32) -> Result<PendingResult> {
        let request = self
            .factory()
            .request_creator()?
            .create_get_in_app_messages_request(count)?;
        self.send_request(request).await
    }

    fn factory(&self) -> &EnvelopeFactory {
        match self {
            RequestProcessor::Online(processor) => &processor.factory,
            RequestProcessor::Offline(processor) => &processor.factory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthHandle, AuthProvider, StaticAuthProvider};
    use crate::config::StoreConfig;
    use crate::network::HttpResponse;
    use crate::test_helpers::{sample_device, MockNetworkSession};
    use serde_json::json;

    fn deps(
        session: &Arc<MockNetworkSession>,
        provider: &Arc<dyn AuthProvider>,
    ) -> RequestProcessorDependencies {
        RequestProcessorDependencies {
            api_key: "zee-api-key".to_string(),
            device_metadata: sample_device(),
            auth_provider: AuthHandle::new(provider, "auth provider"),
            auth_manager: None,
            network_session: session.clone(),
        }
    }

    fn config(mode: ProcessorMode) -> QueueConfig {
        QueueConfig {
            store: StoreConfig::in_memory(),
            processor_mode: mode,
            ..QueueConfig::default()
        }
    }

    fn user() -> Arc<dyn AuthProvider> {
        Arc::new(StaticAuthProvider::new(Auth::with_email("user@example.com")))
    }

    #[tokio::test]
    async fn test_offline_track_event_is_persisted_then_delivered() {
        let session = Arc::new(MockNetworkSession::new());
        let provider = user();
        let processor = RequestProcessor::bootstrap(&config(ProcessorMode::Offline), deps(&session, &provider))
            .await
            .unwrap();
        let offline = processor.as_offline().unwrap();

        let pending = processor.track_event("CustomEvent1", None).await.unwrap();
        assert_eq!(offline.store().count().await.unwrap(), 1);
        assert!(session.requests().is_empty());

        offline.runner().run_once().await.unwrap();
        let value = pending.await.unwrap();
        assert_eq!(value["eventName"], "CustomEvent1");
        assert_eq!(offline.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_online_processor_sends_immediately() {
        let session = Arc::new(MockNetworkSession::new());
        session.push_response(HttpResponse::new(200, json!({"inAppMessages": []}).to_string()));
        let provider = user();
        let processor = RequestProcessor::bootstrap(&config(ProcessorMode::Online), deps(&session, &provider))
            .await
            .unwrap();

        let value = processor.get_in_app_messages(5).await.unwrap().await.unwrap();
        assert_eq!(value, json!({"inAppMessages": []}));
        let sent = session.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].header("SDK-Request-Processor"), Some("Online"));
    }

    #[tokio::test]
    async fn test_online_retryable_failure_rejects() {
        let session = Arc::new(MockNetworkSession::offline());
        let provider = user();
        let processor = OnlineRequestProcessor::new(&config(ProcessorMode::Online), &deps(&session, &provider));

        let error = processor
            .send_request(IterableRequest::post("events/track", None))
            .await
            .unwrap()
            .await
            .unwrap_err();
        assert!(error.reason.unwrap().contains("offline"));
    }

    #[tokio::test]
    async fn test_released_auth_provider_fails_fast() {
        let session = Arc::new(MockNetworkSession::new());
        let provider = user();
        let deps = deps(&session, &provider);
        drop(provider);

        let processor = OnlineRequestProcessor::new(&config(ProcessorMode::Online), &deps);
        let result = processor
            .send_request(IterableRequest::post("events/track", None))
            .await;
        assert!(matches!(result, Err(QueueError::IllegalStateError(_))));
    }

    #[tokio::test]
    async fn test_anonymous_user_cannot_track() {
        let session = Arc::new(MockNetworkSession::new());
        let provider: Arc<dyn AuthProvider> = Arc::new(StaticAuthProvider::default());
        let processor = RequestProcessor::bootstrap(&config(ProcessorMode::Offline), deps(&session, &provider))
            .await
            .unwrap();

        assert!(matches!(
            processor.track_event("e", None).await,
            Err(QueueError::RequestCreationError(_))
        ));
        assert_eq!(processor.as_offline().unwrap().store().count().await.unwrap(), 0);
    }
}
