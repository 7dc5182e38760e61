//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in this order, later
//! sources overriding earlier ones:
//!
//! 1. `offline-queue.yaml` in the configuration directory
//! 2. `offline-queue.{environment}.yaml` (optional)
//! 3. `OFFLINE_QUEUE__SECTION__FIELD` environment variables
//!
//! Missing fields fall back to the defaults in [`QueueConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::QueueConfig;
use config::{Config, Environment, File, Map};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "offline-queue";
const ENV_PREFIX: &str = "OFFLINE_QUEUE";
const ENV_SEPARATOR: &str = "__";

/// Loaded configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: QueueConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_sources(config_dir, environment, None)
    }

    /// Same as [`Self::load_from_directory_with_env`] but reads the variable overrides from
    /// `env_vars` instead of the process environment
    pub fn load_with_sources(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_vars: Option<Map<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        if !config_directory.is_dir() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: config_directory,
            });
        }

        debug!(
            environment = %environment,
            config_directory = %config_directory.display(),
            "Loading offline queue configuration"
        );

        let config = Self::build_config(&config_directory, environment, env_vars)?;
        config.validate()?;

        info!(
            environment = %environment,
            processor_mode = ?config.processor_mode,
            database_url = %config.store.database_url,
            batch_size = config.runner.batch_size,
            max_concurrency = config.runner.max_concurrency,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: QueueConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("OFFLINE_QUEUE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("OFFLINE_QUEUE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn build_config(
        config_directory: &Path,
        environment: &str,
        env_vars: Option<Map<String, String>>,
    ) -> ConfigResult<QueueConfig> {
        let base_path = config_directory.join(format!("{BASE_FILE_STEM}.yaml"));
        let environment_path =
            config_directory.join(format!("{BASE_FILE_STEM}.{environment}.yaml"));

        debug!(
            base = %base_path.display(),
            overlay = %environment_path.display(),
            overlay_present = environment_path.exists(),
            "Resolved configuration sources"
        );

        let mut variables = Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true);
        if env_vars.is_some() {
            variables = variables.source(env_vars);
        }

        Config::builder()
            .add_source(File::from(base_path).required(false))
            .add_source(File::from(environment_path).required(false))
            .add_source(variables)
            .build()
            .and_then(|layered| layered.try_deserialize::<QueueConfig>())
            .map_err(|e| ConfigurationError::load_error(environment, e))
    }
}
