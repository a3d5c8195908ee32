//! Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! yields a working configuration.
//!
//! ```toml
//! [records]
//! max_range_days = 30
//!
//! [competitions]
//! refresh_status_on_read = true
//!
//! [logging]
//! filter = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeagueConfig {
    pub records: RecordsConfig,
    pub competitions: CompetitionsConfig,
    pub logging: LoggingConfig,
}

/// Nightly record queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// Longest span, in days, a range query may cover
    pub max_range_days: u32,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self { max_range_days: 30 }
    }
}

/// Competition reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionsConfig {
    /// Recompute status from the window on every read, persisting changes.
    /// When false, status only moves when a competition is written.
    pub refresh_status_on_read: bool,
}

impl Default for CompetitionsConfig {
    fn default() -> Self {
        Self {
            refresh_status_on_read: true,
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl LeagueConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
