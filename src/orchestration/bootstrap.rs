//! # Queue Bootstrap
//!
//! One call that loads configuration, initializes logging, builds the configured
//! [`RequestProcessor`] and (optionally) starts it.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigManager, QueueConfig, StoreConfig};
use crate::error::Result;
use crate::logging;
use crate::orchestration::request_processor::{RequestProcessor, RequestProcessorDependencies};

/// How to find configuration and whether to start processing right away
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub config_directory: Option<PathBuf>,
    pub environment: Option<String>,
    pub auto_start: bool,
    pub init_logging: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            config_directory: None,
            environment: None,
            auto_start: true,
            init_logging: true,
        }
    }
}

impl BootstrapConfig {
    pub fn with_config_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config_directory = Some(directory.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }
}

/// Snapshot of a running queue
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    pub running: bool,
    pub environment: String,
    pub mode: crate::config::ProcessorMode,
    pub queued_tasks: Option<u64>,
    pub pending_results: usize,
}

/// Lifecycle handle returned by [`QueueBootstrap`]
pub struct QueueSystemHandle {
    pub request_processor: RequestProcessor,
    pub config_manager: Arc<ConfigManager>,
}

impl QueueSystemHandle {
    pub fn is_running(&self) -> bool {
        self.request_processor.is_running()
    }

    pub async fn stop(&self) {
        self.request_processor.stop().await;
        info!("Offline queue stopped");
    }

    pub async fn status(&self) -> Result<SystemStatus> {
        let (queued_tasks, pending_results) = match self.request_processor.as_offline() {
            Some(offline) => (
                Some(offline.store().count().await?),
                offline.notifier().pending_count(),
            ),
            None => (None, 0),
        };

        Ok(SystemStatus {
            running: self.is_running(),
            environment: self.config_manager.environment().to_string(),
            mode: self.request_processor.mode(),
            queued_tasks,
            pending_results,
        })
    }
}

pub struct QueueBootstrap;

impl QueueBootstrap {
    pub async fn bootstrap(
        config: BootstrapConfig,
        deps: RequestProcessorDependencies,
    ) -> Result<QueueSystemHandle> {
        if config.init_logging {
            logging::init_structured_logging();
        }

        let environment = config
            .environment
            .clone()
            .unwrap_or_else(ConfigManager::detect_environment);
        let manager = match &config.config_directory {
            Some(directory) => {
                ConfigManager::load_from_directory_with_env(Some(directory.clone()), &environment)?
            }
            None => ConfigManager::load_from_directory(None)?,
        };

        Self::bootstrap_with_manager(manager, config.auto_start, deps).await
    }

    /// Bootstrap from an already-loaded configuration
    pub async fn bootstrap_with_manager(
        manager: Arc<ConfigManager>,
        auto_start: bool,
        deps: RequestProcessorDependencies,
    ) -> Result<QueueSystemHandle> {
        let request_processor = RequestProcessor::bootstrap(manager.config(), deps).await?;
        if auto_start {
            request_processor.start();
        }

        info!(
            environment = %manager.environment(),
            mode = ?request_processor.mode(),
            running = request_processor.is_running(),
            "Offline queue bootstrapped"
        );

        Ok(QueueSystemHandle {
            request_processor,
            config_manager: manager,
        })
    }

    /// In-memory store, default settings, not started
    pub async fn bootstrap_testing(deps: RequestProcessorDependencies) -> Result<QueueSystemHandle> {
        let config = QueueConfig {
            store: StoreConfig::in_memory(),
            ..QueueConfig::default()
        };
        let manager = ConfigManager::from_config(config, "test")?;
        Self::bootstrap_with_manager(manager, false, deps).await
    }
}
