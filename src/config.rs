//! Scheduler configuration
//!
//! Loaded from the `[scheduler]` table of a TOML file, for example:
//!
//! ```toml
//! [scheduler]
//! label = "pingpong"
//! trace_switches = true
//! ```

use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Prefix for every log line this scheduler emits
    pub label: String,

    /// Log each switch at debug level
    pub trace_switches: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            label: "symswitch".to_string(),
            trace_switches: false,
        }
    }
}

impl SchedulerConfig {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_trace_switches(mut self, trace_switches: bool) -> Self {
        self.trace_switches = trace_switches;
        self
    }

    /// Render as a config file that `load_config` reads back.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let file = ConfigFile {
            scheduler: self.clone(),
        };
        toml::to_string(&file).map_err(|err| ConfigError::Serialize(err.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Serialize(String),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ConfigFile {
    #[serde(default)]
    scheduler: SchedulerConfig,
}

/// Parse config text. A missing `[scheduler]` table means defaults.
pub fn parse_config(content: &str) -> Result<SchedulerConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(content)?;
    Ok(file.scheduler)
}

/// Load configuration from `path`. No path, or a path that does not exist, yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<SchedulerConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };
    if !path.exists() {
        warn!("config file {} not found, using defaults", path.display());
        return Ok(SchedulerConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
