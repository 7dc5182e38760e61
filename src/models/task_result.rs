//! # Task Results
//!
//! Outcome of a single processing attempt ([`TaskResult`]) and the completion signal
//! published for it ([`TaskOutcome`]).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::QueueError;

/// Success detail handed back to the caller: the decoded JSON response body
pub type SendRequestValue = serde_json::Value;

/// Failure detail handed back to the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", .reason.as_deref().unwrap_or("general error"))]
pub struct SendRequestError {
    pub reason: Option<String>,
    /// Raw response body, when there was one
    pub data: Option<Vec<u8>>,
    pub http_status_code: Option<u16>,
}

impl SendRequestError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status_code = Some(status);
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        if !data.is_empty() {
            self.data = Some(data);
        }
        self
    }
}

impl From<&QueueError> for SendRequestError {
    fn from(error: &QueueError) -> Self {
        match error {
            QueueError::ServerError { status, message } => {
                SendRequestError::new(message.clone()).with_status(*status)
            }
            other => SendRequestError::new(other.to_string()),
        }
    }
}

/// Outcome of one processing attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    /// Terminal: remove the task
    Success { detail: SendRequestValue },
    /// Terminal: remove the task and report the failure
    FailureWithNoRetry { detail: SendRequestError },
    /// Non-terminal: reschedule at `now + retry_after`, or the default backoff when `None`
    FailureWithRetry {
        retry_after: Option<Duration>,
        detail: SendRequestError,
    },
}

impl TaskResult {
    pub fn success(detail: SendRequestValue) -> Self {
        TaskResult::Success { detail }
    }

    pub fn no_retry(detail: SendRequestError) -> Self {
        TaskResult::FailureWithNoRetry { detail }
    }

    pub fn retry(retry_after: Option<Duration>, detail: SendRequestError) -> Self {
        TaskResult::FailureWithRetry {
            retry_after,
            detail,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskResult::FailureWithRetry { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskResult::Success { .. } => "success",
            TaskResult::FailureWithNoRetry { .. } => "failure_no_retry",
            TaskResult::FailureWithRetry { .. } => "failure_with_retry",
        }
    }
}

/// Completion signal published by the runner for a task id
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(SendRequestValue),
    FailureNoRetry(SendRequestError),
    /// The task was rescheduled; callers stay pending
    FailureWithRetry {
        retry_after: Duration,
        detail: SendRequestError,
    },
    /// The attempt limit was reached; the task has been removed
    RetryExhausted(SendRequestError),
}

impl TaskOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskOutcome::FailureWithRetry { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskOutcome::Success(_) => "success",
            TaskOutcome::FailureNoRetry(_) => "failure_no_retry",
            TaskOutcome::FailureWithRetry { .. } => "failure_with_retry",
            TaskOutcome::RetryExhausted(_) => "retry_exhausted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_results() {
        assert!(TaskResult::success(json!({})).is_terminal());
        assert!(TaskResult::no_retry(SendRequestError::new("bad request")).is_terminal());
        assert!(!TaskResult::retry(None, SendRequestError::new("offline")).is_terminal());

        assert!(TaskOutcome::RetryExhausted(SendRequestError::default()).is_terminal());
        assert!(!TaskOutcome::FailureWithRetry {
            retry_after: Duration::from_secs(1),
            detail: SendRequestError::default(),
        }
        .is_terminal());
    }

    #[test]
    fn test_send_request_error_display() {
        assert_eq!(SendRequestError::new("Invalid API Key").to_string(), "Invalid API Key");
        assert_eq!(SendRequestError::default().to_string(), "general error");
    }

    #[test]
    fn test_from_queue_error() {
        let error = QueueError::ServerError {
            status: 400,
            message: "Invalid email".to_string(),
        };
        let detail = SendRequestError::from(&error);
        assert_eq!(detail.reason.as_deref(), Some("Invalid email"));
        assert_eq!(detail.http_status_code, Some(400));

        let detail = SendRequestError::from(&QueueError::transport("offline"));
        assert_eq!(detail.reason.as_deref(), Some("Transport error: offline"));
        assert_eq!(detail.http_status_code, None);
    }

    #[test]
    fn test_empty_data_is_not_kept() {
        let detail = SendRequestError::new("x").with_data(Vec::new());
        assert_eq!(detail.data, None);
    }
}
