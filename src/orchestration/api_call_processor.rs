//! # API Call Task Processor
//!
//! Executes persisted `apiCall` tasks: decodes the stored envelope, derives the HTTP
//! request, sends it and classifies the outcome into a [`TaskResult`].
//!
//! A payload that cannot be decoded can never succeed, so it yields
//! `FailureWithNoRetry` and the runner purges the task.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthFailure, AuthManagerHandle, AuthProviderHandle, AuthRefreshDecision};
use crate::config::NetworkConfig;
use crate::constants::headers;
use crate::error::{QueueError, Result};
use crate::models::{ApiCallRequest, SendRequestError, Task, TaskResult, TaskType};
use crate::network::{build_http_request, NetworkSession};
use crate::orchestration::response_classifier::{ResponseCategory, ResponseClassifier};

/// Executes one kind of task.
///
/// Returning `Err` signals a fault in the processor itself rather than in the task; the
/// runner reschedules the task with the default backoff.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn process(&self, task: &Task) -> Result<TaskResult>;
}

pub struct ApiCallTaskProcessor {
    session: Arc<dyn NetworkSession>,
    classifier: ResponseClassifier,
    auth_provider: Option<AuthProviderHandle>,
    auth_manager: Option<AuthManagerHandle>,
    sdk_version: String,
    auth_retry_delay: Duration,
}

impl ApiCallTaskProcessor {
    pub fn new(session: Arc<dyn NetworkSession>, config: &NetworkConfig) -> Self {
        Self {
            session,
            classifier: ResponseClassifier::new(),
            auth_provider: None,
            auth_manager: None,
            sdk_version: config.sdk_version.clone(),
            auth_retry_delay: config.auth_retry_delay(),
        }
    }

    pub fn with_auth_provider(mut self, provider: AuthProviderHandle) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    pub fn with_auth_manager(mut self, manager: AuthManagerHandle) -> Self {
        self.auth_manager = Some(manager);
        self
    }

    /// Send an envelope and classify the outcome.
    ///
    /// `processor` is reported to the server in the `SDK-Request-Processor` header.
    #[instrument(skip(self, envelope), fields(path = envelope.iterable_request.path()))]
    pub async fn execute(&self, envelope: &ApiCallRequest, processor: &str) -> Result<TaskResult> {
        let token = self.current_token(envelope)?;

        let request = match build_http_request(envelope, processor, &self.sdk_version, token.as_deref()) {
            Ok(request) => request,
            Err(error @ QueueError::RequestCreationError(_)) => {
                warn!(error = %error, "Stored request cannot be sent");
                return Ok(TaskResult::no_retry(SendRequestError::from(&error)));
            }
            Err(error) => return Err(error),
        };

        let outcome = self.session.send(&request).await;
        let category = self.classifier.classify(&outcome);
        debug!(
            status = outcome.as_ref().map(|r| r.status).ok(),
            retryable = category.is_retryable(),
            "Classified response"
        );

        Ok(match category {
            ResponseCategory::Success(detail) => TaskResult::success(detail),
            ResponseCategory::NoRetry(detail) => TaskResult::no_retry(detail),
            ResponseCategory::Retry {
                retry_after,
                detail,
            } => TaskResult::retry(retry_after, detail),
            ResponseCategory::AuthFailure { status, detail } => {
                self.handle_auth_failure(envelope, status, token, detail).await?
            }
        })
    }

    /// Token to send: the provider's when it still speaks for the same user, else the stored one
    fn current_token(&self, envelope: &ApiCallRequest) -> Result<Option<String>> {
        let Some(handle) = &self.auth_provider else {
            return Ok(envelope.auth.auth_token.clone());
        };

        let current = handle.upgrade()?.auth();
        if current.same_user(&envelope.auth) && current.auth_token.is_some() {
            Ok(current.auth_token)
        } else {
            Ok(envelope.auth.auth_token.clone())
        }
    }

    async fn handle_auth_failure(
        &self,
        envelope: &ApiCallRequest,
        status: u16,
        failed_token: Option<String>,
        detail: SendRequestError,
    ) -> Result<TaskResult> {
        let Some(handle) = &self.auth_manager else {
            info!(status, "Request rejected as unauthorized; no auth manager configured");
            return Ok(TaskResult::no_retry(detail));
        };

        let manager = handle.upgrade()?;
        let failure = AuthFailure {
            auth: envelope.auth.clone(),
            status,
            reason: detail.reason.clone(),
            failed_token,
        };

        match manager.handle_auth_failure(&failure).await {
            AuthRefreshDecision::RetryAfterRefresh => {
                info!(status, "Auth refreshed; retrying request");
                Ok(TaskResult::retry(Some(self.auth_retry_delay), detail))
            }
            AuthRefreshDecision::GiveUp => {
                let error = QueueError::AuthError(
                    detail.reason.clone().unwrap_or_else(|| "Unauthorized".to_string()),
                );
                info!(status, error = %error, "Auth manager declined to refresh; giving up");
                Ok(TaskResult::no_retry(SendRequestError {
                    reason: Some(error.to_string()),
                    ..detail
                }))
            }
        }
    }
}

#[async_trait]
impl TaskProcessor for ApiCallTaskProcessor {
    fn task_type(&self) -> TaskType {
        TaskType::ApiCall
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, attempts = task.attempts))]
    async fn process(&self, task: &Task) -> Result<TaskResult> {
        let envelope = match ApiCallRequest::from_bytes(&task.data) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(error = %error, "Stored api call payload is malformed");
                return Ok(TaskResult::no_retry(SendRequestError::new(format!(
                    "could not decode stored request: {error}"
                ))));
            }
        };

        self.execute(&envelope, headers::PROCESSOR_OFFLINE).await
    }
}
