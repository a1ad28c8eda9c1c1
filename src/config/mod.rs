//! Configuration module for flowbus
//!
//! A [`BusConfig`] is handed to a [`Runtime`](crate::runtime::Runtime) when it
//! is created. It can be built in code or loaded from a file:
//!
//! - `*.toml` files are parsed as TOML
//! - anything else is parsed as JSON
//!
//! Every field has a default, so a config file only needs the values it
//! changes.
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! max_generations = 10
//! auto_flush = true
//! flush_delay_ms = 0
//!
//! [logging]
//! filter = "info,flowbus=debug"
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{BusError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Flush scheduler settings
    pub scheduler: SchedulerSettings,

    /// Logging settings
    pub logging: LogSettings,
}

impl BusConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BusError::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Parse a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| BusError::Config(format!("Failed to parse JSON config: {}", e)))
    }

    /// Load a config file, choosing the format from its extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BusError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        let config = if is_toml(path) {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
        .with_context(|| format!("Config file {:?}", path))?;

        tracing::debug!("Loaded bus config from {:?}", path);
        Ok(config)
    }

    /// Load a config file, returning defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load bus config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config, choosing the format from the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| BusError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| BusError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)
            .map_err(|e| BusError::Config(format!("Failed to write config: {}", e)))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = BusConfig::from_toml_str("[scheduler]\nmax_generations = 4\n").unwrap();
        assert_eq!(config.scheduler.max_generations, 4);
        assert!(config.scheduler.auto_flush);
        assert_eq!(config.logging, LogSettings::default());
    }

    #[test]
    fn test_json_config() {
        let config =
            BusConfig::from_json_str(r#"{ "logging": { "filter": "debug" } }"#).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.scheduler, SchedulerSettings::default());
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = BusConfig::from_toml_str("scheduler = 3").unwrap_err();
        assert!(matches!(err, BusError::Config(_)));
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.toml");

        let mut config = BusConfig::default();
        config.scheduler.flush_delay_ms = 16;
        config.save(&path).unwrap();

        let loaded = BusConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.json");

        let mut config = BusConfig::default();
        config.scheduler.auto_flush = false;
        config.save(&path).unwrap();

        assert_eq!(BusConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = BusConfig::load(&path).unwrap_err();
        assert!(matches!(err, BusError::WithContext { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = BusConfig::load_or_default("/definitely/not/here.toml");
        assert_eq!(config, BusConfig::default());
    }
}
