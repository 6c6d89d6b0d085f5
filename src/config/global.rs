//! Global configuration for the CLI.
//!
//! Loaded from ~/.config/runloop/runloop.yml or .runloop.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Global configuration for runloop.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Checkpoint storage settings.
    pub storage: StorageConfig,

    /// Exit condition evaluation settings.
    pub evaluation: EvaluationConfig,

    /// Event emission settings.
    pub events: EventsConfig,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .runloop.yml in current directory
    /// 3. ~/.config/runloop/runloop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try project config
        let project_config = PathBuf::from(".runloop.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .runloop.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .runloop.yml: {}", e);
                }
            }
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("runloop").join("runloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // Use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.provision_timeout_ms == 0 {
            eyre::bail!("storage.provision-timeout-ms must be > 0");
        }
        if !matches!(self.storage.backend.as_str(), "auto" | "primary" | "fallback") {
            eyre::bail!(
                "storage.backend must be one of: auto, primary, fallback (got '{}')",
                self.storage.backend
            );
        }
        if self.evaluation.tool_timeout_secs == 0 {
            eyre::bail!("evaluation.tool-timeout-secs must be > 0");
        }
        if self.evaluation.output_limit == 0 {
            eyre::bail!("evaluation.output-limit must be > 0");
        }
        if self.events.queue_capacity == 0 {
            eyre::bail!("events.queue-capacity must be > 0");
        }
        Ok(())
    }
}

/// Checkpoint storage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the durable fallback database.
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,

    /// Backend selection: "auto", "primary", or "fallback".
    pub backend: String,

    /// Primary store provisioning timeout in milliseconds.
    #[serde(rename = "provision-timeout-ms")]
    pub provision_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let default_db = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("runloop")
            .join("checkpoints.db");

        Self {
            database_path: default_db,
            backend: "auto".to_string(),
            provision_timeout_ms: 5_000,
        }
    }
}

/// Exit condition evaluation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Timeout per verification tool invocation in seconds.
    #[serde(rename = "tool-timeout-secs")]
    pub tool_timeout_secs: u64,

    /// Maximum characters of tool output retained per evaluation.
    #[serde(rename = "output-limit")]
    pub output_limit: usize,

    /// Working directory for verification tools (defaults to cwd).
    #[serde(rename = "working-dir")]
    pub working_dir: Option<PathBuf>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            output_limit: 2_000,
            working_dir: None,
        }
    }
}

/// Event emission settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Bounded event queue capacity.
    #[serde(rename = "queue-capacity")]
    pub queue_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}
