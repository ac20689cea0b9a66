//! Layered configuration
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file: the explicit path, else `CHATFLOW_CONFIG_PATH`, else
//!    `chatflow.toml` in the working directory when it exists
//! 3. Environment variables `CHATFLOW__SECTION__KEY`
//!    (e.g. `CHATFLOW__ENGINE__FREEFALL_LIMIT=50`)
//!
//! Settings authored in a flow document override the engine section for that
//! flow, see [`EngineConfig::with_document_settings`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::flow::DocumentSettings;

const DEFAULT_CONFIG_FILE: &str = "chatflow.toml";
const CONFIG_PATH_ENV: &str = "CHATFLOW_CONFIG_PATH";
const ENV_PREFIX: &str = "CHATFLOW";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Engine behaviour. Immutable once handed to an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Consecutive steps without input before the run is cut off
    pub freefall_limit: usize,
    /// Page the conversation starts on and restarts from
    pub entry_page: String,
    /// Page visited when the user goes idle, if the document has it
    pub idle_page: String,
    /// Seconds of waiting for input before going idle; unset disables it
    pub idle_after_secs: Option<f64>,
    pub case_sensitive_triggers: bool,
    pub record_inputs: bool,
    pub record_outputs: bool,
    /// Attach storage patches to step events (see `debug`)
    pub record_patches: bool,
    /// Buffer of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            freefall_limit: 1000,
            entry_page: "/start".to_string(),
            idle_page: "/on-idle".to_string(),
            idle_after_secs: None,
            case_sensitive_triggers: false,
            record_inputs: false,
            record_outputs: false,
            record_patches: false,
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn idle_after(&self) -> Option<Duration> {
        self.idle_after_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Apply the settings a flow document carries.
    pub fn with_document_settings(mut self, settings: &DocumentSettings) -> Self {
        if let Some(case_sensitive) = settings.case_sensitive_trigger {
            self.case_sensitive_triggers = case_sensitive;
        }
        if let Some(idle_after) = settings.idle_after_seconds {
            self.idle_after_secs = Some(idle_after);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources.
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Config file path (overrides default search)
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Ignore `CHATFLOW__*` environment variables
    pub fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    pub fn build(self) -> Result<Config> {
        let defaults = config::Config::try_from(&Config::default())
            .context("Failed to serialize default configuration")?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some((path, required)) = self.config_file() {
            builder = builder.add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(required),
            );
        }

        if !self.skip_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// The file to read and whether it must exist.
    fn config_file(&self) -> Option<(PathBuf, bool)> {
        if let Some(path) = &self.config_path {
            return Some((path.clone(), true));
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some((PathBuf::from(path), true));
        }
        let default = Path::new(DEFAULT_CONFIG_FILE);
        default.exists().then(|| (default.to_path_buf(), false))
    }
}
