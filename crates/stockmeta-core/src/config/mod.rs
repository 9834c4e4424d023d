//! Configuration management for stockmeta.
//!
//! Configuration is loaded from the platform config dir (`config.toml`) with
//! sensible defaults. Every section is optional in the file.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retry, rate-limit and timeout policy
    pub runtime: RuntimeConfig,

    /// Metadata generation settings
    pub generation: GenerationConfig,

    /// Available categories per photobank
    pub photobanks: PhotobanksConfig,

    /// Provider settings
    pub providers: ProvidersConfig,

    /// Media discovery settings
    pub discovery: DiscoveryConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.stockmeta.stockmeta/config.toml
    /// - Linux: ~/.config/stockmeta/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\stockmeta\config\config.toml
    ///
    /// Falls back to ~/.stockmeta/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "stockmeta", "stockmeta")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".stockmeta").join("config.toml")
            })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
