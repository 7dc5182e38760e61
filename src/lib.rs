#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Offline Queue
//!
//! Durable, retrying delivery of SDK API calls.
//!
//! ## Overview
//!
//! Every outbound API call is serialized into a task and committed to a local SQLite
//! store before any network I/O happens. A background runner picks ready tasks up,
//! sends them, and classifies each response: successes and permanent failures remove
//! the task and complete the caller's future; transient failures reschedule the task
//! with backoff. Queued work survives restarts and loss of connectivity.
//!
//! ## Module Organization
//!
//! - [`store`] - transactional task storage
//! - [`orchestration`] - scheduler, runner, processors and completion notifier
//! - [`network`] - HTTP boundary and request derivation
//! - [`models`] - tasks, API call envelopes and results
//! - [`auth`] - non-owning handles to the SDK's auth collaborators
//! - [`config`] - layered YAML and environment configuration
//! - [`error`] - structured error handling
//! - [`logging`] - structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use offline_queue::auth::{AuthHandle, AuthProvider, StaticAuthProvider};
//! use offline_queue::config::{QueueConfig, StoreConfig};
//! use offline_queue::models::{Auth, DeviceMetadata};
//! use offline_queue::network::ReqwestNetworkSession;
//! use offline_queue::orchestration::{RequestProcessor, RequestProcessorDependencies};
//!
//! # async fn example() -> offline_queue::Result<()> {
//! let config = QueueConfig {
//!     store: StoreConfig::in_memory(),
//!     ..QueueConfig::default()
//! };
//! let provider: Arc<dyn AuthProvider> =
//!     Arc::new(StaticAuthProvider::new(Auth::with_email("user@example.com")));
//!
//! let processor = RequestProcessor::bootstrap(
//!     &config,
//!     RequestProcessorDependencies {
//!         api_key: "api-key".to_string(),
//!         device_metadata: DeviceMetadata {
//!             device_id: "device".to_string(),
//!             platform: "iOS".to_string(),
//!             app_package_name: "com.example.app".to_string(),
//!         },
//!         auth_provider: AuthHandle::new(&provider, "auth provider"),
//!         auth_manager: None,
//!         network_session: Arc::new(ReqwestNetworkSession::new(&config.network)?),
//!     },
//! )
//! .await?;
//! processor.start();
//!
//! let response = processor.track_event("purchase", None).await?.await;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod network;
pub mod orchestration;
pub mod store;
pub mod test_helpers;

pub use config::{ConfigManager, ProcessorMode, QueueConfig};
pub use error::{QueueError, Result};
pub use models::{ApiCallRequest, IterableRequest, SendRequestError, SendRequestValue, Task, TaskResult, TaskType};
pub use orchestration::{
    CompletionNotifier, PendingResult, RequestProcessor, TaskRunner, TaskScheduler,
};
pub use store::{StoreContext, TaskStore};
