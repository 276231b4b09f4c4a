//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::NodeStoreConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file and environment.
    pub fn load() -> Result<NodeStoreConfig, ApiError> {
        let config = MergeService::load()?;
        config.storage.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<NodeStoreConfig, ApiError> {
        let config = MergeService::load_from_file(path)?;
        config.storage.validate()?;
        Ok(config)
    }

    /// Create default configuration.
    pub fn default() -> NodeStoreConfig {
        NodeStoreConfig::default()
    }

    /// Write `config` to `path` as TOML, creating parent directories.
    pub fn save(path: &Path, config: &NodeStoreConfig) -> Result<(), ApiError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ApiError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        std::fs::write(path, config.to_toml()?).map_err(|e| {
            ApiError::ConfigError(format!(
                "Failed to write config to {}: {}",
                path.display(),
                e
            ))
        })
    }
}
