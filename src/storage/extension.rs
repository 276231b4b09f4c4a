//! Node-specific extension seam for version records.
//!
//! The aggregate owns the common fields. Anything a particular kind of node stores next
//! to them, and any legacy-layout handling it needs, goes through this trait.

use super::directory::StorageDirectory;
use super::legacy;
use crate::error::StorageError;
use crate::types::LayoutVersion;
use crate::version::ExtraFields;
use std::path::PathBuf;

/// Strategy passed to [`Storage`](super::Storage) at construction.
pub trait StorageExtension: Send {
    /// Extension fields to persist for `dir`.
    fn extra_fields_of(&self, dir: &StorageDirectory) -> Result<ExtraFields, StorageError>;

    /// Absorb the extension fields read back from `dir`.
    fn merge_extra_fields(
        &mut self,
        dir: &StorageDirectory,
        fields: &ExtraFields,
    ) -> Result<(), StorageError>;

    /// True when `dir` still holds pre-layout state that this software cannot upgrade.
    fn is_conversion_needed(&self, _dir: &StorageDirectory) -> Result<bool, StorageError> {
        Ok(false)
    }

    /// File to poison so that pre-layout software refuses to start on `dir`.
    fn pre_upgrade_marker(&self, _dir: &StorageDirectory) -> Option<PathBuf> {
        None
    }
}

/// Extension that carries one shared set of fields across every directory.
///
/// Fields read from any directory are merged; a key seen with two different values is an
/// inconsistency. Optionally manages a pre-upgrade marker file relative to each root.
#[derive(Debug, Clone, Default)]
pub struct PlainExtension {
    fields: ExtraFields,
    legacy_marker: Option<(PathBuf, LayoutVersion)>,
}

impl PlainExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields(fields: ExtraFields) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Manage `relative` under each root as a pre-upgrade marker. Existing markers whose
    /// layout version is not newer than `last_pre_upgrade` require conversion.
    pub fn with_legacy_marker(mut self, relative: impl Into<PathBuf>, last_pre_upgrade: LayoutVersion) -> Self {
        self.legacy_marker = Some((relative.into(), last_pre_upgrade));
        self
    }

    pub fn fields(&self) -> &ExtraFields {
        &self.fields
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }
}

impl StorageExtension for PlainExtension {
    fn extra_fields_of(&self, _dir: &StorageDirectory) -> Result<ExtraFields, StorageError> {
        Ok(self.fields.clone())
    }

    fn merge_extra_fields(
        &mut self,
        dir: &StorageDirectory,
        fields: &ExtraFields,
    ) -> Result<(), StorageError> {
        for (key, value) in fields {
            match self.fields.get(key) {
                Some(existing) if existing != value => {
                    return Err(StorageError::inconsistent(
                        dir.root(),
                        format!(
                            "field '{}' is '{}' but other directories have '{}'.",
                            key, value, existing
                        ),
                    ));
                }
                Some(_) => {}
                None => {
                    self.fields.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    fn is_conversion_needed(&self, dir: &StorageDirectory) -> Result<bool, StorageError> {
        match &self.legacy_marker {
            Some((relative, last_pre_upgrade)) => {
                legacy::needs_conversion(&dir.root().join(relative), *last_pre_upgrade)
            }
            None => Ok(false),
        }
    }

    fn pre_upgrade_marker(&self, dir: &StorageDirectory) -> Option<PathBuf> {
        self.legacy_marker
            .as_ref()
            .map(|(relative, _)| dir.root().join(relative))
    }
}
