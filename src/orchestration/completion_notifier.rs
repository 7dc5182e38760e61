//! # Completion Notifier
//!
//! Bridges terminal task outcomes back to the caller that scheduled the task.
//!
//! Each registration creates a oneshot channel keyed by task id. The runner publishes a
//! [`TaskOutcome`] when a task reaches a terminal state and the matching [`PendingResult`]
//! resolves. Outcomes for ids nobody registered (for example tasks persisted by a previous
//! process) are logged and dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{QueueError, Result};
use crate::models::{SendRequestError, SendRequestValue, TaskOutcome};

/// What a caller eventually receives for a scheduled request
pub type CompletionResult = std::result::Result<SendRequestValue, SendRequestError>;

/// Boundary the runner reports outcomes through
pub trait TaskCompletionPublisher: Send + Sync {
    fn publish(&self, task_id: &str, outcome: &TaskOutcome);
}

/// Publisher that discards every outcome
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCompletionPublisher;

impl TaskCompletionPublisher for NoopCompletionPublisher {
    fn publish(&self, task_id: &str, outcome: &TaskOutcome) {
        debug!(task_id = %task_id, outcome = outcome.kind(), "Outcome discarded");
    }
}

/// Caller-side handle for one scheduled task
#[derive(Debug)]
pub struct PendingResult {
    task_id: String,
    receiver: oneshot::Receiver<CompletionResult>,
}

impl PendingResult {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl Future for PendingResult {
    type Output = CompletionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(SendRequestError::new("task abandoned")))
        })
    }
}

/// Pending completion map keyed by task id
#[derive(Debug, Default)]
pub struct CompletionNotifier {
    pending: Mutex<HashMap<String, oneshot::Sender<CompletionResult>>>,
}

impl CompletionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `task_id`; at most one registration per id
    pub fn register(&self, task_id: &str) -> Result<PendingResult> {
        let mut pending = self.pending.lock();
        if pending.contains_key(task_id) {
            return Err(QueueError::illegal_state(format!(
                "task {task_id} already has a pending result"
            )));
        }

        let (sender, receiver) = oneshot::channel();
        pending.insert(task_id.to_string(), sender);
        debug!(task_id = %task_id, "Pending result registered");

        Ok(PendingResult {
            task_id: task_id.to_string(),
            receiver,
        })
    }

    pub fn resolve(&self, task_id: &str, value: SendRequestValue) {
        self.complete(task_id, Ok(value));
    }

    pub fn reject(&self, task_id: &str, error: SendRequestError) {
        self.complete(task_id, Err(error));
    }

    /// Drop a registration without completing it; the handle resolves as abandoned
    pub fn discard(&self, task_id: &str) -> bool {
        self.pending.lock().remove(task_id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, task_id: &str) -> bool {
        self.pending.lock().contains_key(task_id)
    }

    fn complete(&self, task_id: &str, result: CompletionResult) {
        let sender = self.pending.lock().remove(task_id);
        match sender {
            Some(sender) => {
                if sender.send(result).is_err() {
                    debug!(task_id = %task_id, "Caller stopped waiting before completion");
                }
            }
            None => warn!(task_id = %task_id, "Completion for unregistered task ignored"),
        }
    }
}

impl TaskCompletionPublisher for CompletionNotifier {
    fn publish(&self, task_id: &str, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Success(value) => self.resolve(task_id, value.clone()),
            TaskOutcome::FailureNoRetry(detail) | TaskOutcome::RetryExhausted(detail) => {
                self.reject(task_id, detail.clone())
            }
            TaskOutcome::FailureWithRetry { retry_after, .. } => {
                debug!(
                    task_id = %task_id,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Task rescheduled; caller stays pending"
                );
            }
        }
    }
}
