//! # Offline Queue Configuration
//!
//! Typed configuration for the task store, the runner, the retry backoff curve and the
//! network layer. Values come from layered YAML files plus `OFFLINE_QUEUE__` environment
//! variables (see [`loader::ConfigManager`]); every section has defaults so an empty file
//! is a valid configuration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use offline_queue::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let batch_size = manager.config().runner.batch_size;
//! let poll_interval = manager.config().runner.poll_interval();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::constants::DEFAULT_API_ENDPOINT;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/offline-queue.yaml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Durable task store settings
    pub store: StoreConfig,

    /// Background runner settings
    pub runner: RunnerConfig,

    /// Retry backoff curve
    pub backoff: BackoffConfig,

    /// HTTP settings
    pub network: NetworkConfig,

    /// Which request processor variant the SDK uses
    pub processor_mode: ProcessorMode,
}

/// Request processor variant selected at bootstrap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorMode {
    /// Persist every request and deliver it through the task runner
    #[default]
    Offline,
    /// Send every request immediately with no persistence
    Online,
}

/// Task store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite connection string; `sqlite::memory:` keeps the queue in process memory
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://offline-queue.db".to_string(),
            max_connections: 4,
        }
    }
}

impl StoreConfig {
    /// In-memory store, mostly for tests
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

/// Task runner configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub poll_interval_ms: u64,
    /// Maximum number of ready tasks fetched per poll
    pub batch_size: u32,
    /// Maximum number of attempts processing concurrently
    pub max_concurrency: usize,
    /// Attempts after which a retryable failure becomes terminal; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Wait after a failed poll before polling the store again
    pub store_error_backoff_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            batch_size: 10,
            max_concurrency: 4,
            max_attempts: None,
            store_error_backoff_ms: 5000,
        }
    }
}

impl RunnerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn store_error_backoff(&self) -> Duration {
        Duration::from_millis(self.store_error_backoff_ms)
    }
}

/// Backoff and retry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Upper bound of the random extra delay, as a fraction of the computed delay
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 2000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
            jitter_factor: 0.1,
        }
    }
}

impl BackoffConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Network configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL every request path is appended to; must end with `/`
    pub api_endpoint: String,
    pub request_timeout_ms: u64,
    /// Delay before retrying a request whose auth token was refreshed
    pub auth_retry_delay_ms: u64,
    pub sdk_version: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            request_timeout_ms: 30_000,
            auth_retry_delay_ms: 1000,
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn auth_retry_delay(&self) -> Duration {
        Duration::from_millis(self.auth_retry_delay_ms)
    }
}

impl QueueConfig {
    /// Reject values the runner or backoff curve cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.database_url.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "store.database_url",
                "store configuration",
            ));
        }

        if self.store.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "store.max_connections",
                "0",
                "connection count must be greater than 0",
            ));
        }

        if self.runner.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "runner.batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        if self.runner.max_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "runner.max_concurrency",
                "0",
                "concurrency limit must be greater than 0",
            ));
        }

        if self.runner.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigurationError::invalid_value(
                "runner.max_concurrency",
                self.runner.max_concurrency.to_string(),
                format!("concurrency limit cannot exceed {}", Semaphore::MAX_PERMITS),
            ));
        }

        if self.runner.max_attempts == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "runner.max_attempts",
                "0",
                "omit max_attempts to retry forever",
            ));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "backoff.jitter_factor",
                self.backoff.jitter_factor.to_string(),
                "jitter factor must be between 0.0 and 1.0",
            ));
        }

        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.base_delay_ms",
                self.backoff.base_delay_ms.to_string(),
                "base delay cannot exceed max_delay_ms",
            ));
        }

        if self.network.api_endpoint.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "network.api_endpoint",
                "network configuration",
            ));
        }

        if !self.network.api_endpoint.ends_with('/') {
            return Err(ConfigurationError::invalid_value(
                "network.api_endpoint",
                self.network.api_endpoint.clone(),
                "endpoint must end with '/'",
            ));
        }

        Ok(())
    }
}
