//! Engine configuration loaded from `weft.toml`.
//!
//! Every section and field has a default, so an absent or empty file
//! yields a fully usable configuration.

use std::path::Path;

use serde::Deserialize;

/// Errors raised while loading or validating a `weft.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}

/// The engine configuration parsed from `weft.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Buffer cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Task and job scheduling.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Remote store connection.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Buffer cache tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Buffers at or below this size get the longer temporary lifetime.
    #[serde(default = "default_small_buffer_limit")]
    pub small_buffer_limit: u64,
    /// Grace period in seconds for large unreferenced buffers.
    #[serde(default = "default_lifetime_temp_secs")]
    pub lifetime_temp_secs: u64,
    /// Grace period in seconds for small unreferenced buffers.
    #[serde(default = "default_lifetime_temp_small_secs")]
    pub lifetime_temp_small_secs: u64,
}

/// Task and job scheduling.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Number of execution worker threads.
    #[serde(default = "default_job_pool_size")]
    pub job_pool_size: usize,
    /// Upper bound on tasks handled per `compute` call.
    #[serde(default = "default_max_tasks_per_compute")]
    pub max_tasks_per_compute: usize,
}

/// Remote store connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteConfig {
    /// Address of the remote store, or `None` to run standalone.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_small_buffer_limit() -> u64 {
    100_000
}

fn default_lifetime_temp_secs() -> u64 {
    20
}

fn default_lifetime_temp_small_secs() -> u64 {
    600
}

fn default_job_pool_size() -> usize {
    4
}

fn default_max_tasks_per_compute() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            small_buffer_limit: default_small_buffer_limit(),
            lifetime_temp_secs: default_lifetime_temp_secs(),
            lifetime_temp_small_secs: default_lifetime_temp_small_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_pool_size: default_job_pool_size(),
            max_tasks_per_compute: default_max_tasks_per_compute(),
        }
    }
}

/// Loads and validates a `weft.toml` from a directory. A missing file
/// yields the defaults.
pub fn load_config(dir: &Path) -> Result<EngineConfig, ConfigError> {
    let path = dir.join("weft.toml");
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let content = std::fs::read_to_string(&path)?;
    load_config_from_str(&content)
}

/// Parses and validates a configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.scheduler.job_pool_size == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.job_pool_size must be at least 1".to_string(),
        ));
    }
    if config.scheduler.max_tasks_per_compute == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.max_tasks_per_compute must be at least 1".to_string(),
        ));
    }
    Ok(())
}
