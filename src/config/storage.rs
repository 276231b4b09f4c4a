//! StorageConfig: which directories make up the node's storage, and how to open them.

use crate::config::xdg;
use crate::error::ApiError;
use crate::storage::{LayoutVersions, StartupReport, Storage, StorageDirectory, StorageExtension};
use crate::types::{
    DirType, LayoutVersion, NodeRole, StartupOption, DEFAULT_LAYOUT_VERSION,
    LAST_PRE_UPGRADE_LAYOUT_VERSION, LAST_UPGRADABLE_LAYOUT_VERSION,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

fn default_role() -> NodeRole {
    NodeRole::DataNode
}

fn default_true() -> bool {
    true
}

fn default_current_version() -> LayoutVersion {
    DEFAULT_LAYOUT_VERSION
}

fn default_last_upgradable_version() -> LayoutVersion {
    LAST_UPGRADABLE_LAYOUT_VERSION
}

fn default_last_pre_upgrade_version() -> LayoutVersion {
    LAST_PRE_UPGRADE_LAYOUT_VERSION
}

/// One configured storage root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Root path; relative paths resolve against the process working directory
    pub path: PathBuf,

    /// Optional capability mask for filtered iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir_type: Option<DirType>,
}

/// Layout versions understood by this software
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_current_version")]
    pub current_version: LayoutVersion,

    #[serde(default = "default_last_upgradable_version")]
    pub last_upgradable_version: LayoutVersion,

    #[serde(default = "default_last_pre_upgrade_version")]
    pub last_pre_upgrade_version: LayoutVersion,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            current_version: default_current_version(),
            last_upgradable_version: default_last_upgradable_version(),
            last_pre_upgrade_version: default_last_pre_upgrade_version(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Node role recorded in every version file
    #[serde(default = "default_role")]
    pub role: NodeRole,

    /// Storage roots in order; empty means the XDG default for the role
    #[serde(default)]
    pub directories: Vec<DirectoryConfig>,

    #[serde(default)]
    pub layout: LayoutConfig,

    /// Check each directory for working exclusive locks after startup
    #[serde(default = "default_true")]
    pub check_lock_support: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            directories: Vec::new(),
            layout: LayoutConfig::default(),
            check_lock_support: default_true(),
        }
    }
}

impl StorageConfig {
    pub fn layout_versions(&self) -> LayoutVersions {
        LayoutVersions {
            current: self.layout.current_version,
            last_upgradable: self.layout.last_upgradable_version,
        }
    }

    /// Check version ordering and directory list sanity.
    pub fn validate(&self) -> Result<(), ApiError> {
        let layout = &self.layout;
        if layout.last_upgradable_version < layout.current_version {
            return Err(ApiError::ConfigError(format!(
                "last_upgradable_version {} is newer than current_version {}",
                layout.last_upgradable_version, layout.current_version
            )));
        }
        if layout.last_pre_upgrade_version < layout.last_upgradable_version {
            return Err(ApiError::ConfigError(format!(
                "last_pre_upgrade_version {} is newer than last_upgradable_version {}",
                layout.last_pre_upgrade_version, layout.last_upgradable_version
            )));
        }
        let mut seen = HashSet::new();
        for dir in &self.directories {
            if dir.path.as_os_str().is_empty() {
                return Err(ApiError::ConfigError(
                    "Storage directory path cannot be empty".to_string(),
                ));
            }
            if !seen.insert(&dir.path) {
                return Err(ApiError::ConfigError(format!(
                    "Storage directory {} is listed more than once",
                    dir.path.display()
                )));
            }
        }
        Ok(())
    }

    /// Resolve configured roots to absolute paths.
    pub fn resolve_directories(&self) -> Result<Vec<DirectoryConfig>, ApiError> {
        if self.directories.is_empty() {
            return Ok(vec![DirectoryConfig {
                path: xdg::default_storage_root(self.role)?,
                dir_type: None,
            }]);
        }
        let cwd = std::env::current_dir().map_err(|e| {
            ApiError::ConfigError(format!("Failed to read working directory: {}", e))
        })?;
        Ok(self
            .directories
            .iter()
            .map(|d| DirectoryConfig {
                path: if d.path.is_absolute() {
                    d.path.clone()
                } else {
                    cwd.join(&d.path)
                },
                dir_type: d.dir_type,
            })
            .collect())
    }

    /// Build an aggregate over the configured directories. Nothing is touched on disk.
    pub fn build_storage(&self, extension: Box<dyn StorageExtension>) -> Result<Storage, ApiError> {
        self.validate()?;
        let mut storage = Storage::new(self.role, self.layout_versions(), extension);
        for dir in self.resolve_directories()? {
            storage.add_directory(match dir.dir_type {
                Some(t) => StorageDirectory::with_type(dir.path, t),
                None => StorageDirectory::new(dir.path),
            });
        }
        Ok(storage)
    }

    /// Build the aggregate and run the startup flow for `intent`.
    pub fn open(
        &self,
        extension: Box<dyn StorageExtension>,
        intent: StartupOption,
    ) -> Result<(Storage, StartupReport), ApiError> {
        let mut storage = self.build_storage(extension)?;
        let report = storage.recover_all(intent)?;
        if self.check_lock_support {
            for idx in 0..storage.num_directories() {
                if !storage.is_lock_supported(idx)? {
                    tracing::warn!(
                        "Storage directory {} does not support exclusive locking; \
                         another process may share it",
                        storage.directory(idx)?.root().display()
                    );
                }
            }
        }
        Ok((storage, report))
    }
}
