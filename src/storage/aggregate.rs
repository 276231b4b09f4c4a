//! Storage aggregate
//!
//! An ordered set of storage directories that together hold one node's persistent
//! state. Every directory carries the same version record; the aggregate checks that
//! they agree and writes them all back in one pass.

use super::directory::StorageDirectory;
use super::extension::StorageExtension;
use super::legacy;
use super::state::StorageState;
use crate::error::StorageError;
use crate::types::{DirType, LayoutVersion, NamespaceId, NodeRole, StartupOption};
use crate::types::{DEFAULT_LAYOUT_VERSION, LAST_UPGRADABLE_LAYOUT_VERSION};
use crate::version::VersionRecord;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Layout versions this software writes and accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutVersions {
    /// Version written by this software
    pub current: LayoutVersion,
    /// Oldest version this software can upgrade from
    pub last_upgradable: LayoutVersion,
}

impl Default for LayoutVersions {
    fn default() -> Self {
        Self {
            current: DEFAULT_LAYOUT_VERSION,
            last_upgradable: LAST_UPGRADABLE_LAYOUT_VERSION,
        }
    }
}

/// Common fields shared by every directory of an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub layout_version: LayoutVersion,
    pub namespace_id: NamespaceId,
    pub ctime: i64,
}

impl StorageInfo {
    /// Identifier the node registers with: `NS-<namespaceId>-<layoutVersion>-<cTime>`
    pub fn registration_id(&self) -> String {
        format!(
            "NS-{}-{}-{}",
            self.namespace_id, self.layout_version, self.ctime
        )
    }
}

/// State found for one directory during startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStatus {
    pub root: PathBuf,
    /// State classified before any recovery ran
    pub state: StorageState,
}

impl DirectoryStatus {
    pub fn recovered(&self) -> bool {
        self.state.needs_recovery()
    }
}

/// Outcome of [`Storage::recover_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Directories kept in the aggregate, in order
    pub directories: Vec<DirectoryStatus>,
    /// Roots dropped because they do not exist or cannot be written
    pub dropped: Vec<PathBuf>,
}

impl StartupReport {
    /// True when at least one kept directory still needs formatting
    pub fn has_unformatted(&self) -> bool {
        self.directories
            .iter()
            .any(|d| d.state == StorageState::NotFormatted)
    }

    pub fn all_normal(&self) -> bool {
        self.directories
            .iter()
            .all(|d| d.state == StorageState::Normal)
    }
}

/// Storage aggregate for one node
pub struct Storage {
    role: NodeRole,
    layout: LayoutVersions,
    info: StorageInfo,
    dirs: Vec<StorageDirectory>,
    extension: Box<dyn StorageExtension>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("role", &self.role)
            .field("layout", &self.layout)
            .field("info", &self.info)
            .field("dirs", &self.dirs)
            .finish()
    }
}

impl Storage {
    /// Create an empty aggregate. Namespace id and creation time start unset.
    pub fn new(role: NodeRole, layout: LayoutVersions, extension: Box<dyn StorageExtension>) -> Self {
        Self {
            role,
            layout,
            info: StorageInfo {
                layout_version: layout.current,
                namespace_id: 0,
                ctime: 0,
            },
            dirs: Vec::new(),
            extension,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn layout(&self) -> LayoutVersions {
        self.layout
    }

    pub fn info(&self) -> &StorageInfo {
        &self.info
    }

    pub fn set_namespace(&mut self, namespace_id: NamespaceId, ctime: i64) {
        self.info.namespace_id = namespace_id;
        self.info.ctime = ctime;
    }

    pub fn registration_id(&self) -> String {
        self.info.registration_id()
    }

    pub fn extension(&self) -> &dyn StorageExtension {
        self.extension.as_ref()
    }

    pub fn extension_mut(&mut self) -> &mut dyn StorageExtension {
        self.extension.as_mut()
    }

    pub fn add_directory(&mut self, dir: StorageDirectory) {
        self.dirs.push(dir);
    }

    /// Remove and return the directory at `idx`, keeping the order of the rest.
    pub fn remove_directory(&mut self, idx: usize) -> Result<StorageDirectory, StorageError> {
        self.check_index(idx)?;
        Ok(self.dirs.remove(idx))
    }

    pub fn num_directories(&self) -> usize {
        self.dirs.len()
    }

    pub fn directory(&self, idx: usize) -> Result<&StorageDirectory, StorageError> {
        self.check_index(idx)?;
        Ok(&self.dirs[idx])
    }

    pub fn directory_mut(&mut self, idx: usize) -> Result<&mut StorageDirectory, StorageError> {
        self.check_index(idx)?;
        Ok(&mut self.dirs[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorageDirectory> {
        self.dirs.iter()
    }

    /// Directories of `dir_type`, or all of them when `None`.
    pub fn iter_of_type(&self, dir_type: Option<DirType>) -> impl Iterator<Item = &StorageDirectory> {
        self.dirs
            .iter()
            .filter(move |d| dir_type.map_or(true, |t| d.is_of_type(t)))
    }

    pub fn iter_where<'a, P>(&'a self, mut predicate: P) -> impl Iterator<Item = &'a StorageDirectory>
    where
        P: FnMut(&StorageDirectory) -> bool + 'a,
    {
        self.dirs.iter().filter(move |d| predicate(d))
    }

    fn check_index(&self, idx: usize) -> Result<(), StorageError> {
        if idx < self.dirs.len() {
            Ok(())
        } else {
            Err(StorageError::DirectoryIndex {
                index: idx,
                count: self.dirs.len(),
            })
        }
    }

    /// Reject an upgrade from `old`, or from unknown pre-layout state when `old` is 0.
    pub fn check_version_upgradable(&self, old: LayoutVersion) -> Result<(), StorageError> {
        check_version_upgradable(old, self.layout.last_upgradable)
    }

    /// Validate `record` against the aggregate and adopt its common fields.
    pub fn read_common_fields(
        &mut self,
        record: &VersionRecord,
        dir: &StorageDirectory,
    ) -> Result<(), StorageError> {
        adopt_common_fields(&mut self.info, self.role, self.layout, record, dir)
    }

    /// Build the record this aggregate would write to `dir`.
    pub fn write_common_fields(&self, dir: &StorageDirectory) -> Result<VersionRecord, StorageError> {
        let mut record = VersionRecord::new(
            self.info.layout_version,
            self.role,
            self.info.namespace_id,
            self.info.ctime,
        );
        record.extra = self.extension.extra_fields_of(dir)?;
        Ok(record)
    }

    /// Read, validate and adopt the version record of the directory at `idx`.
    pub fn read_directory(&mut self, idx: usize) -> Result<VersionRecord, StorageError> {
        self.check_index(idx)?;
        let dir = &self.dirs[idx];
        let record = dir.read()?;
        adopt_common_fields(&mut self.info, self.role, self.layout, &record, dir)?;
        self.extension.merge_extra_fields(dir, &record.extra)?;
        Ok(record)
    }

    /// Poison legacy state if the extension asks for it, then write the version record.
    pub fn write_directory(&self, idx: usize) -> Result<(), StorageError> {
        let dir = self.directory(idx)?;
        if let Some(marker) = self.extension.pre_upgrade_marker(dir) {
            legacy::write_pre_upgrade_marker(&marker, self.layout.current)?;
        }
        let record = self.write_common_fields(dir)?;
        dir.write(&record)
    }

    /// Write every directory at the current software layout version.
    ///
    /// All directories are attempted; failures are reported together.
    pub fn write_all(&mut self) -> Result<(), StorageError> {
        self.info.layout_version = self.layout.current;
        let mut failures = Vec::new();
        for idx in 0..self.dirs.len() {
            if let Err(e) = self.write_directory(idx) {
                warn!("Failed to write storage directory {}: {}", self.dirs[idx].root().display(), e);
                failures.push((self.dirs[idx].root().to_path_buf(), e));
            }
        }
        collect("write", failures)
    }

    /// Unlock every directory, continuing past failures.
    pub fn unlock_all(&mut self) -> Result<(), StorageError> {
        let mut failures = Vec::new();
        for dir in &mut self.dirs {
            if let Err(e) = dir.unlock() {
                warn!("Failed to unlock storage directory {}: {}", dir.root().display(), e);
                failures.push((dir.root().to_path_buf(), e));
            }
        }
        collect("unlock", failures)
    }

    /// Check whether the filesystem under directory `idx` enforces exclusive locks.
    ///
    /// Locks taken only for the check are released before returning.
    pub fn is_lock_supported(&self, idx: usize) -> Result<bool, StorageError> {
        let dir = self.directory(idx)?;
        let _first = if dir.is_locked() {
            None
        } else {
            match dir.try_lock()? {
                Some(lock) => Some(lock),
                None => return Ok(true),
            }
        };
        let second = dir.try_lock()?;
        Ok(second.is_none())
    }

    /// Classify directory `idx`, rejecting unconvertible pre-layout state unless the intent
    /// is `Import`.
    pub fn analyze_directory(
        &mut self,
        idx: usize,
        intent: StartupOption,
    ) -> Result<StorageState, StorageError> {
        self.check_index(idx)?;
        let extension = self.extension.as_ref();
        let last_upgradable = self.layout.last_upgradable;
        self.dirs[idx].analyze_storage_with(intent, |dir| {
            if extension.is_conversion_needed(dir)? {
                check_version_upgradable(0, last_upgradable)?;
            }
            Ok(())
        })
    }

    /// Startup flow: classify, lock and recover every directory, drop the ones that do not
    /// exist, then cross-validate the version records of every formatted directory.
    pub fn recover_all(&mut self, intent: StartupOption) -> Result<StartupReport, StorageError> {
        let mut report = StartupReport::default();
        let mut idx = 0;
        while idx < self.dirs.len() {
            let state = self.analyze_directory(idx, intent)?;
            if state == StorageState::NonExistent {
                let dir = self.dirs.remove(idx);
                info!("Ignoring storage directory {}", dir.root().display());
                report.dropped.push(dir.root().to_path_buf());
                continue;
            }
            if state.needs_recovery() {
                self.dirs[idx].do_recover(state)?;
            }
            report.directories.push(DirectoryStatus {
                root: self.dirs[idx].root().to_path_buf(),
                state,
            });
            idx += 1;
        }

        for idx in 0..self.dirs.len() {
            if report.directories[idx].state != StorageState::NotFormatted {
                self.read_directory(idx)?;
            }
        }
        Ok(report)
    }

    /// Format directory `idx`: clear `current/`, let `populate` write domain content, then
    /// write the version record last.
    pub fn format_directory<F>(&mut self, idx: usize, populate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&StorageDirectory) -> Result<(), StorageError>,
    {
        self.info.layout_version = self.layout.current;
        let dir = self.directory(idx)?;
        dir.clear_directory()?;
        populate(dir)?;
        self.write_directory(idx)?;
        info!("Storage directory {} has been successfully formatted.", dir.root().display());
        Ok(())
    }
}

fn adopt_common_fields(
    info: &mut StorageInfo,
    role: NodeRole,
    layout: LayoutVersions,
    record: &VersionRecord,
    dir: &StorageDirectory,
) -> Result<(), StorageError> {
    let ns = info.namespace_id;
    let namespace_ok = ns == 0 || record.namespace_id == 0 || ns == record.namespace_id;
    if record.role != role || !namespace_ok {
        return Err(StorageError::inconsistent(
            dir.root(),
            format!(
                "is incompatible with others (role {} namespace {}, expected role {} namespace {}).",
                record.role, record.namespace_id, role, ns
            ),
        ));
    }
    let lv = record.layout_version;
    if lv > layout.current && lv > layout.last_upgradable {
        let err = StorageError::VersionTooOld {
            old: lv,
            min_supported: layout.last_upgradable,
        };
        error!("Storage directory {}: {}", dir.root().display(), err);
        return Err(err);
    }
    if lv < layout.current {
        return Err(StorageError::FutureVersion {
            root: dir.root().to_path_buf(),
            reported: lv,
            expected: layout.current,
        });
    }

    info.layout_version = lv;
    if record.namespace_id != 0 {
        info.namespace_id = record.namespace_id;
    }
    info.ctime = record.ctime;
    Ok(())
}

fn check_version_upgradable(old: LayoutVersion, last_upgradable: LayoutVersion) -> Result<(), StorageError> {
    if old > last_upgradable {
        let err = StorageError::VersionTooOld {
            old,
            min_supported: last_upgradable,
        };
        error!("{}", err);
        return Err(err);
    }
    Ok(())
}

fn collect(operation: &'static str, failures: Vec<(PathBuf, StorageError)>) -> Result<(), StorageError> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(StorageError::Aggregate { operation, failures })
    }
}
