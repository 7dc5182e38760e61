//! # Task Scheduler
//!
//! Turns an API call envelope into a persisted task. Insert and commit happen in one
//! store context; the returned id is valid as soon as `schedule` returns, while the
//! network call happens later on the runner.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, instrument};

use crate::error::{QueueError, Result};
use crate::models::{ApiCallRequest, Task, TaskType};
use crate::store::TaskStore;

/// Per-call scheduling options
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    /// Run as soon as possible, do not coalesce
    pub blocking: bool,
    /// Defer the first attempt
    pub delay: Option<Duration>,
    pub name: Option<String>,
}

impl ScheduleOptions {
    pub fn blocking() -> Self {
        Self {
            blocking: true,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct TaskScheduler {
    store: TaskStore,
    wake: Arc<Notify>,
}

impl TaskScheduler {
    /// `wake` is signalled after every commit so a runner picks up new work immediately
    pub fn new(store: TaskStore, wake: Arc<Notify>) -> Self {
        Self { store, wake }
    }

    pub async fn schedule(&self, request: &ApiCallRequest, options: ScheduleOptions) -> Result<String> {
        self.schedule_with_hook(request, options, |_| Ok(())).await
    }

    /// Schedule and run `hook` with the new task id after the insert, before the commit.
    ///
    /// An error from the hook aborts the schedule; nothing is persisted. If the commit
    /// itself fails, whatever the hook set up must be undone by the caller.
    #[instrument(skip(self, request, options, hook), fields(path = request.iterable_request.path(), blocking = options.blocking))]
    pub async fn schedule_with_hook<F>(
        &self,
        request: &ApiCallRequest,
        options: ScheduleOptions,
        hook: F,
    ) -> Result<String>
    where
        F: FnOnce(&str) -> Result<()>,
    {
        let data = request.to_bytes()?;
        let task = build_task(data, &options)?;

        let mut context = self.store.context().await?;
        context.create(&task).await?;
        hook(&task.id)?;
        context.save().await?;

        info!(task_id = %task.id, scheduled_at = %task.scheduled_at, "Task scheduled");
        self.wake.notify_one();
        Ok(task.id)
    }
}

fn build_task(data: Vec<u8>, options: &ScheduleOptions) -> Result<Task> {
    let now = Task::now();
    let scheduled_at = match options.delay {
        Some(delay) => {
            let delay = ChronoDuration::from_std(delay)
                .map_err(|e| QueueError::request_creation(format!("invalid delay: {e}")))?;
            now.checked_add_signed(delay)
                .ok_or_else(|| QueueError::request_creation("delay out of range"))?
        }
        None => now,
    };

    let mut task = Task::new(TaskType::ApiCall, data, scheduled_at).with_blocking(options.blocking);
    if let Some(name) = &options.name {
        task = task.with_name(name.clone());
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::sample_envelope;

    async fn scheduler() -> (TaskScheduler, TaskStore, Arc<Notify>) {
        let store = TaskStore::in_memory().await.unwrap();
        let wake = Arc::new(Notify::new());
        (TaskScheduler::new(store.clone(), wake.clone()), store, wake)
    }

    #[tokio::test]
    async fn test_schedule_persists_envelope() {
        let (scheduler, store, _) = scheduler().await;
        let envelope = sample_envelope();

        let task_id = scheduler
            .schedule(&envelope, ScheduleOptions::blocking().with_name("track"))
            .await
            .unwrap();

        let task = store.find_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.task_type, TaskType::ApiCall);
        assert_eq!(task.attempts, 0);
        assert!(task.blocking);
        assert_eq!(task.name.as_deref(), Some("track"));
        assert!(task.is_ready(Task::now()));
        assert_eq!(ApiCallRequest::from_bytes(&task.data).unwrap(), envelope);
    }

    #[tokio::test]
    async fn test_delay_defers_first_attempt() {
        let (scheduler, store, _) = scheduler().await;
        let task_id = scheduler
            .schedule(
                &sample_envelope(),
                ScheduleOptions::default().with_delay(Duration::from_secs(60)),
            )
            .await
            .unwrap();

        let task = store.find_task(&task_id).await.unwrap().unwrap();
        assert!(!task.is_ready(Task::now()));
        assert!(store.next_ready_tasks(Task::now(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_hook_persists_nothing() {
        let (scheduler, store, _) = scheduler().await;

        let result = scheduler
            .schedule_with_hook(&sample_envelope(), ScheduleOptions::default(), |_| {
                Err(QueueError::illegal_state("already registered"))
            })
            .await;

        assert!(matches!(result, Err(QueueError::IllegalStateError(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_schedule_wakes_runner() {
        let (scheduler, _, wake) = scheduler().await;
        let notified = wake.notified();

        scheduler
            .schedule(&sample_envelope(), ScheduleOptions::default())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), notified)
            .await
            .unwrap();
    }
}
