//! # Task Runner
//!
//! Background driver that makes queued tasks progress without caller involvement.
//!
//! ## Lifecycle
//!
//! `stopped -> running -> stopped`. [`TaskRunner::start`] spawns a polling loop and
//! [`TaskRunner::stop`] ends it; both are idempotent. Stopping never cancels attempts
//! already talking to the network: they finish (or time out at the transport) and write
//! their result back. Loop attempts still waiting for a concurrency permit release their
//! claim without running, so no new request starts after `stop`. [`TaskRunner::run_once`]
//! works whether or not the loop is running.
//!
//! ## Dispatch
//!
//! Each pass fetches up to `batch_size` tasks with `scheduled_at <= now` and hands each to
//! the processor registered for its [`TaskType`]. A task id is claimed in an in-flight set
//! before dispatch and released only after its result has been committed, so one id never
//! has two attempts outstanding. Attempts run concurrently up to `max_concurrency`.
//!
//! ## Results
//!
//! | Result | Store | Published |
//! |---|---|---|
//! | success | delete | `Success` |
//! | failure, no retry | delete | `FailureNoRetry` |
//! | failure, retry | reschedule, `attempts + 1` | `FailureWithRetry` |
//! | failure, retry, attempt limit reached | delete | `RetryExhausted` |

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{BackoffConfig, RunnerConfig};
use crate::error::Result;
use crate::logging::{log_error, log_task_operation};
use crate::models::{SendRequestError, Task, TaskOutcome, TaskResult, TaskType};
use crate::orchestration::api_call_processor::TaskProcessor;
use crate::orchestration::backoff::BackoffCalculator;
use crate::orchestration::completion_notifier::{NoopCompletionPublisher, TaskCompletionPublisher};
use crate::store::TaskStore;

struct RunnerInner {
    store: TaskStore,
    config: RunnerConfig,
    backoff: BackoffCalculator,
    processors: DashMap<TaskType, Arc<dyn TaskProcessor>>,
    publisher: Arc<dyn TaskCompletionPublisher>,
    in_flight: DashSet<String>,
    permits: Arc<Semaphore>,
    wake: Arc<Notify>,
    running: AtomicBool,
}

/// Who asked for a dispatch pass; loop attempts stand down once the runner stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchOrigin {
    Loop,
    Caller,
}

struct LoopHandle {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

pub struct TaskRunner {
    inner: Arc<RunnerInner>,
    lifecycle: parking_lot::Mutex<Option<LoopHandle>>,
}

impl TaskRunner {
    /// Runner whose completions go nowhere
    pub fn new(store: TaskStore, config: RunnerConfig, backoff: BackoffConfig) -> Self {
        Self::with_publisher(store, config, backoff, Arc::new(NoopCompletionPublisher))
    }

    pub fn with_publisher(
        store: TaskStore,
        config: RunnerConfig,
        backoff: BackoffConfig,
        publisher: Arc<dyn TaskCompletionPublisher>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(
            config.max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
        ));
        Self {
            inner: Arc::new(RunnerInner {
                store,
                config,
                backoff: BackoffCalculator::new(backoff),
                processors: DashMap::new(),
                publisher,
                in_flight: DashSet::new(),
                permits,
                wake: Arc::new(Notify::new()),
                running: AtomicBool::new(false),
            }),
            lifecycle: parking_lot::Mutex::new(None),
        }
    }

    pub fn register_processor(&self, processor: Arc<dyn TaskProcessor>) {
        let task_type = processor.task_type();
        info!(task_type = %task_type, "Registered task processor");
        self.inner.processors.insert(task_type, processor);
    }

    pub fn wake_handle(&self) -> Arc<Notify> {
        self.inner.wake.clone()
    }

    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Number of attempts currently outstanding
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Nudge the loop to poll now instead of at the next interval
    pub fn wake(&self) {
        self.inner.wake.notify_one();
    }

    /// Start the polling loop; no-op when already running
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if self.inner.running.swap(true, Ordering::AcqRel) {
            debug!("Task runner already running");
            return;
        }

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(Arc::downgrade(&self.inner), shutdown.clone()));
        *lifecycle = Some(LoopHandle { shutdown, handle });
        info!(
            poll_interval_ms = self.inner.config.poll_interval_ms,
            batch_size = self.inner.config.batch_size,
            max_concurrency = self.inner.config.max_concurrency,
            "Task runner started"
        );
    }

    /// Stop scheduling new attempts and wait for the loop to exit
    pub async fn stop(&self) {
        let loop_handle = {
            let mut lifecycle = self.lifecycle.lock();
            self.inner.running.store(false, Ordering::Release);
            lifecycle.take()
        };

        let Some(LoopHandle { shutdown, handle }) = loop_handle else {
            return;
        };
        shutdown.notify_one();
        if let Err(e) = handle.await {
            warn!(error = %e, "Task runner loop ended abnormally");
        }
        info!(
            in_flight = self.inner.in_flight.len(),
            "Task runner stopped"
        );
    }

    /// One dispatch pass that waits for every attempt it started.
    ///
    /// Returns the number of attempts dispatched.
    pub async fn run_once(&self) -> Result<usize> {
        let handles = RunnerInner::dispatch(&self.inner, DispatchOrigin::Caller).await?;
        let dispatched = handles.len();
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Task attempt panicked");
            }
        }
        Ok(dispatched)
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(loop_handle) = self.lifecycle.lock().take() {
            loop_handle.shutdown.notify_one();
        }
    }
}

async fn run_loop(weak: Weak<RunnerInner>, shutdown: Arc<Notify>) {
    debug!("Task runner loop entered");
    loop {
        let Some(inner) = weak.upgrade() else {
            debug!("Task runner dropped; loop exiting");
            break;
        };
        if !inner.running.load(Ordering::Acquire) {
            break;
        }

        let wait = match RunnerInner::dispatch(&inner, DispatchOrigin::Loop).await {
            Ok(_) => inner.config.poll_interval(),
            Err(e) => {
                log_error("task_runner", "poll", &e.to_string(), Some("backing off before next poll"));
                inner.config.store_error_backoff()
            }
        };
        if !inner.running.load(Ordering::Acquire) {
            break;
        }
        let wake = inner.wake.clone();
        drop(inner);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {},
            _ = wake.notified() => debug!("Task runner woken"),
            _ = shutdown.notified() => {
                debug!("Shutdown notification received");
                break;
            }
        }
    }
    debug!("Task runner loop exited");
}

impl RunnerInner {
    /// Claim and spawn every ready task; returns the spawned attempts
    async fn dispatch(
        inner: &Arc<RunnerInner>,
        origin: DispatchOrigin,
    ) -> Result<Vec<JoinHandle<()>>> {
        let now = Task::now();
        let ready = inner
            .store
            .next_ready_tasks(now, inner.config.batch_size)
            .await?;
        if inner.stood_down(origin) {
            debug!(ready = ready.len(), "Runner stopped during poll; batch not dispatched");
            return Ok(Vec::new());
        }

        let mut handles = Vec::with_capacity(ready.len());
        for task in ready {
            if !inner.in_flight.insert(task.id.clone()) {
                debug!(task_id = %task.id, "Task already in flight; skipped");
                continue;
            }

            let attempt_inner = inner.clone();
            handles.push(tokio::spawn(async move {
                attempt_inner.attempt(task.id, origin).await;
            }));
        }

        if !handles.is_empty() {
            debug!(dispatched = handles.len(), "Dispatched ready tasks");
        }
        Ok(handles)
    }

    /// Run one attempt for a claimed id and release the claim afterwards
    async fn attempt(self: Arc<Self>, task_id: String, origin: DispatchOrigin) {
        match self.permits.clone().acquire_owned().await {
            Ok(_permit) if self.stood_down(origin) => {
                debug!(task_id = %task_id, "Runner stopped before attempt started; claim released");
            }
            Ok(_permit) => {
                if let Err(e) = self.process_claimed(&task_id).await {
                    log_error("task_runner", "attempt", &e.to_string(), Some(task_id.as_str()));
                }
            }
            Err(_) => warn!(task_id = %task_id, "Concurrency limiter closed"),
        }
        self.in_flight.remove(&task_id);
    }

    fn stood_down(&self, origin: DispatchOrigin) -> bool {
        origin == DispatchOrigin::Loop && !self.running.load(Ordering::Acquire)
    }

    #[instrument(skip(self))]
    async fn process_claimed(&self, task_id: &str) -> Result<()> {
        // The batch may be stale: re-read after claiming
        let Some(task) = self.store.find_task(task_id).await? else {
            debug!("Task finished before its claim; skipped");
            return Ok(());
        };
        if !task.is_ready(Task::now()) {
            debug!("Task was rescheduled before its claim; skipped");
            return Ok(());
        }

        let result = match self.processors.get(&task.task_type).map(|p| p.value().clone()) {
            Some(processor) => match processor.process(&task).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Processor failed; task will be retried");
                    TaskResult::retry(None, SendRequestError::from(&e))
                }
            },
            None => {
                warn!(task_type = %task.task_type, "No processor for task type; purging task");
                TaskResult::no_retry(SendRequestError::new(format!(
                    "unsupported task type: {}",
                    task.task_type
                )))
            }
        };

        self.apply_result(task, result).await
    }

    async fn apply_result(&self, task: Task, result: TaskResult) -> Result<()> {
        let now = Task::now();
        let outcome = match result {
            TaskResult::Success { detail } => {
                self.remove(&task.id).await?;
                TaskOutcome::Success(detail)
            }
            TaskResult::FailureWithNoRetry { detail } => {
                self.remove(&task.id).await?;
                TaskOutcome::FailureNoRetry(detail)
            }
            TaskResult::FailureWithRetry {
                retry_after,
                detail,
            } => {
                let attempts = task.attempts.saturating_add(1);
                if self.config.max_attempts.is_some_and(|max| attempts >= max) {
                    self.remove(&task.id).await?;
                    TaskOutcome::RetryExhausted(detail)
                } else {
                    let delay = self.backoff.retry_delay(attempts, retry_after);
                    let retried = task.rescheduled(after(now, delay), now);
                    let mut context = self.store.context().await?;
                    context.update(&retried).await?;
                    context.save().await?;
                    TaskOutcome::FailureWithRetry {
                        retry_after: delay,
                        detail,
                    }
                }
            }
        };

        log_task_operation(
            "attempt",
            &task.id,
            task.task_type.as_str(),
            task.attempts.saturating_add(1),
            outcome.kind(),
            None,
        );
        self.publisher.publish(&task.id, &outcome);
        Ok(())
    }

    async fn remove(&self, task_id: &str) -> Result<()> {
        let mut context = self.store.context().await?;
        context.delete(task_id).await?;
        context.save().await
    }
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
