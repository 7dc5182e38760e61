//! # Queue Orchestration
//!
//! Scheduling, running and completing queued API calls.
//!
//! ```text
//! RequestProcessor ──schedule──▶ TaskScheduler ──insert──▶ TaskStore
//!        ▲                                                    │
//!   PendingResult                                        next_ready_tasks
//!        │                                                    ▼
//! CompletionNotifier ◀──publish── TaskRunner ──process──▶ ApiCallTaskProcessor ──▶ NetworkSession
//! ```
//!
//! - [`task_scheduler`] - persists envelopes as tasks
//! - [`task_runner`] - background polling, dispatch, retry and purge
//! - [`api_call_processor`] - executes `apiCall` tasks
//! - [`response_classifier`] - maps HTTP outcomes to task results
//! - [`backoff`] - default retry delay curve
//! - [`completion_notifier`] - task id to caller future bridge
//! - [`request_processor`] - online and offline SDK entry points
//! - [`bootstrap`] - configuration-driven system assembly

pub mod api_call_processor;
pub mod backoff;
pub mod bootstrap;
pub mod completion_notifier;
pub mod request_processor;
pub mod response_classifier;
pub mod task_runner;
pub mod task_scheduler;

pub use api_call_processor::{ApiCallTaskProcessor, TaskProcessor};
pub use backoff::BackoffCalculator;
pub use bootstrap::{BootstrapConfig, QueueBootstrap, QueueSystemHandle, SystemStatus};
pub use completion_notifier::{
    CompletionNotifier, CompletionResult, NoopCompletionPublisher, PendingResult,
    TaskCompletionPublisher,
};
pub use request_processor::{
    OfflineRequestProcessor, OnlineRequestProcessor, RequestProcessor,
    RequestProcessorDependencies,
};
pub use response_classifier::{ResponseCategory, ResponseClassifier};
pub use task_runner::TaskRunner;
pub use task_scheduler::{ScheduleOptions, TaskScheduler};
