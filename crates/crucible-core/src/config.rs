//! Orchestrator configuration loaded from TOML with env overrides.
//!
//! Search order: an explicit path wins, then the per-user config file at
//! `<config_dir>/crucible/config.toml`, then built-in defaults. A missing
//! file is not an error; a malformed one is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crucible_providers::{
    ProviderSettings, RetryPolicy, DEFAULT_AGENT_ENDPOINT, DEFAULT_POD_API_URL,
};

/// Env var holding the cloud pod API key.
pub const POD_API_KEY_ENV: &str = "CRUCIBLE_POD_API_KEY";
/// Env var overriding the trainer agent endpoint.
pub const AGENT_ENDPOINT_ENV: &str = "CRUCIBLE_AGENT_ENDPOINT";
/// Env var overriding the data directory.
pub const DATA_DIR_ENV: &str = "CRUCIBLE_DATA_DIR";

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Root directory for the registry, checkpoints, and job files.
    pub data_dir: PathBuf,
    /// Registry database path; `<data_dir>/jobs.db` when unset.
    pub database_path: Option<PathBuf>,
    /// Checkpoint directory; `<data_dir>/checkpoints` when unset.
    pub checkpoint_dir: Option<PathBuf>,
    /// Local trainer agent endpoint.
    pub agent_endpoint: String,
    /// Command to run the trainer as a co-located subprocess. When unset,
    /// local jobs go through the agent.
    pub trainer_command: Option<Vec<String>>,
    /// Cloud pod vendor API root.
    pub pod_api_url: String,
    /// Cloud pod vendor API key. Usually supplied via env, not the file.
    pub pod_api_key: Option<String>,
    /// GPU used for estimates when a submission names none.
    pub default_gpu: String,
    /// Container image for pods when the request names none.
    pub default_docker_image: Option<String>,
    /// Volume size for pods when the request names none.
    pub default_volume_gb: Option<u32>,
    /// Grace window before a cancelled subprocess is killed, seconds.
    pub graceful_kill_timeout_secs: u64,
    /// HTTP timeout for backend calls, seconds.
    pub http_timeout_secs: u64,
    /// Dispatch attempts before a transient failure becomes permanent.
    pub retry_max_attempts: u32,
    /// Base delay of the exponential dispatch backoff, milliseconds.
    pub retry_backoff_ms: u64,
    /// Age at which a queued job that was never picked up expires, seconds.
    pub queue_staleness_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: None,
            checkpoint_dir: None,
            agent_endpoint: DEFAULT_AGENT_ENDPOINT.to_string(),
            trainer_command: None,
            pod_api_url: DEFAULT_POD_API_URL.to_string(),
            pod_api_key: None,
            default_gpu: "rtx-4090".to_string(),
            default_docker_image: None,
            default_volume_gb: None,
            graceful_kill_timeout_secs: 10,
            http_timeout_secs: 30,
            retry_max_attempts: 3,
            retry_backoff_ms: 250,
            queue_staleness_secs: 3600,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from(".crucible"), |dir| dir.join("crucible"))
}

impl OrchestratorConfig {
    /// Loads configuration from an explicit TOML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads the per-user config file if one exists, otherwise defaults,
    /// then applies env overrides either way.
    pub fn discover() -> Result<Self, ConfigError> {
        let mut config = match Self::default_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            Some(path) => {
                debug!("No configuration at {}, using defaults", path.display());
                Self::default()
            }
            None => {
                debug!("No user config directory, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// `<config_dir>/crucible/config.toml`, when a config dir exists.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("crucible").join("config.toml"))
    }

    /// Applies `CRUCIBLE_*` env overrides on top of whatever was loaded.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(POD_API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.pod_api_key = Some(key);
            }
        }
        if let Ok(endpoint) = std::env::var(AGENT_ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                self.agent_endpoint = endpoint;
            }
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_gpu.trim().is_empty() {
            return Err(ConfigError::Validation("default_gpu must not be empty".to_string()));
        }
        if self.retry_max_attempts < 1 {
            return Err(ConfigError::Validation("retry_max_attempts must be >= 1".to_string()));
        }
        if self.http_timeout_secs == 0 {
            warn!("http_timeout_secs is 0; backend calls will not time out");
        }
        Ok(())
    }

    /// Resolved registry database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| self.data_dir.join("jobs.db"))
    }

    /// Resolved checkpoint directory.
    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint_dir.clone().unwrap_or_else(|| self.data_dir.join("checkpoints"))
    }

    /// Provider wiring derived from this configuration.
    #[must_use]
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            agent_endpoint: self.agent_endpoint.clone(),
            trainer_command: self.trainer_command.clone(),
            workdir: self.data_dir.join("jobs"),
            graceful_kill_timeout: Duration::from_secs(self.graceful_kill_timeout_secs),
            pod_api_url: self.pod_api_url.clone(),
            pod_api_key: self.pod_api_key.clone(),
            pod_timeout: Duration::from_secs(self.http_timeout_secs),
            default_docker_image: self.default_docker_image.clone(),
            default_volume_gb: self.default_volume_gb,
        }
    }

    /// Dispatch retry policy derived from this configuration.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            backoff_base: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// How long a queued job may wait before expiring.
    #[must_use]
    pub fn queue_staleness(&self) -> Duration {
        Duration::from_secs(self.queue_staleness_secs)
    }
}
