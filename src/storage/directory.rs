//! StorageDirectory
//!
//! One root path holding a node's versioned state. The directory classifies itself at
//! startup, completes or undoes interrupted transitions, and holds an exclusive lock on
//! its root for as long as the owning process runs.

use super::fs_ops::{self, delete_dir, display_path, rename};
use super::lock::{DirLock, LOCK_FILE_NAME};
use super::state::{classify, DirectoryFacts, StorageState};
use crate::error::StorageError;
use crate::types::{DirType, StartupOption};
use crate::version::VersionRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const STORAGE_DIR_CURRENT: &str = "current";
pub const STORAGE_DIR_PREVIOUS: &str = "previous";
pub const STORAGE_FILE_VERSION: &str = "VERSION";
pub const STORAGE_TMP_REMOVED: &str = "removed.tmp";
pub const STORAGE_TMP_PREVIOUS: &str = "previous.tmp";
pub const STORAGE_TMP_FINALIZED: &str = "finalized.tmp";
pub const STORAGE_TMP_LAST_CKPT: &str = "lastcheckpoint.tmp";
pub const STORAGE_PREVIOUS_CKPT: &str = "previous.checkpoint";

/// One storage directory and its lock
#[derive(Debug)]
pub struct StorageDirectory {
    root: PathBuf,
    lock: Option<DirLock>,
    dir_type: Option<DirType>,
}

impl StorageDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: None,
            dir_type: None,
        }
    }

    pub fn with_type(root: impl Into<PathBuf>, dir_type: DirType) -> Self {
        Self {
            dir_type: Some(dir_type),
            ..Self::new(root)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_type(&self) -> Option<DirType> {
        self.dir_type
    }

    /// True when this directory has a type and it covers `dir_type`
    pub fn is_of_type(&self, dir_type: DirType) -> bool {
        self.dir_type.map_or(false, |t| t.is_of_type(dir_type))
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn current_dir(&self) -> PathBuf {
        self.root.join(STORAGE_DIR_CURRENT)
    }

    pub fn version_file(&self) -> PathBuf {
        self.current_dir().join(STORAGE_FILE_VERSION)
    }

    pub fn previous_dir(&self) -> PathBuf {
        self.root.join(STORAGE_DIR_PREVIOUS)
    }

    pub fn previous_version_file(&self) -> PathBuf {
        self.previous_dir().join(STORAGE_FILE_VERSION)
    }

    pub fn previous_tmp(&self) -> PathBuf {
        self.root.join(STORAGE_TMP_PREVIOUS)
    }

    pub fn removed_tmp(&self) -> PathBuf {
        self.root.join(STORAGE_TMP_REMOVED)
    }

    pub fn finalized_tmp(&self) -> PathBuf {
        self.root.join(STORAGE_TMP_FINALIZED)
    }

    pub fn last_checkpoint_tmp(&self) -> PathBuf {
        self.root.join(STORAGE_TMP_LAST_CKPT)
    }

    pub fn previous_checkpoint(&self) -> PathBuf {
        self.root.join(STORAGE_PREVIOUS_CKPT)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Read `current/VERSION`.
    pub fn read(&self) -> Result<VersionRecord, StorageError> {
        self.read_from(&self.version_file())
    }

    pub fn read_from(&self, from: &Path) -> Result<VersionRecord, StorageError> {
        VersionRecord::read_from(from)
    }

    /// Persist `record` as `current/VERSION`.
    pub fn write(&self, record: &VersionRecord) -> Result<(), StorageError> {
        self.write_to(&self.version_file(), record)
    }

    pub fn write_to(&self, to: &Path, record: &VersionRecord) -> Result<(), StorageError> {
        record.write_to(to)?;
        debug!("Wrote version file {}", to.display());
        Ok(())
    }

    /// Remove `current/` and recreate it empty.
    ///
    /// The version file is not written here: the owning layer populates its content
    /// first and writes the record last.
    pub fn clear_directory(&self) -> Result<(), StorageError> {
        let cur = self.current_dir();
        if cur.exists() {
            delete_dir(&cur).map_err(|e| {
                StorageError::io(
                    &cur,
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Cannot remove current directory: {}", e),
                    ),
                )
            })?;
        }
        fs::create_dir_all(&cur).map_err(|e| StorageError::io(&cur, e))
    }

    /// Which well-known children exist right now
    pub fn facts(&self) -> DirectoryFacts {
        DirectoryFacts {
            has_current: self.version_file().exists(),
            has_previous: self.previous_dir().exists(),
            has_previous_tmp: self.previous_tmp().exists(),
            has_removed_tmp: self.removed_tmp().exists(),
            has_finalized_tmp: self.finalized_tmp().exists(),
            has_checkpoint_tmp: self.last_checkpoint_tmp().exists(),
        }
    }

    /// Classify the directory, locking it as a side effect.
    pub fn analyze_storage(&mut self, intent: StartupOption) -> Result<StorageState, StorageError> {
        self.analyze_storage_with(intent, |_| Ok(()))
    }

    /// Classify the directory, running `precheck` once the lock is held unless the intent
    /// is `Format` or `Import`.
    pub fn analyze_storage_with<F>(
        &mut self,
        intent: StartupOption,
        precheck: F,
    ) -> Result<StorageState, StorageError>
    where
        F: FnOnce(&StorageDirectory) -> Result<(), StorageError>,
    {
        let root_path = display_path(&self.root);
        if !self.root.exists() {
            if intent != StartupOption::Format {
                info!("Storage directory {} does not exist.", root_path);
                return Ok(StorageState::NonExistent);
            }
            info!("{} does not exist. Creating ...", root_path);
            fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        }
        if !self.root.is_dir() {
            info!("{} is not a directory.", root_path);
            return Ok(StorageState::NonExistent);
        }
        if !is_writable(&self.root) {
            info!("Cannot access storage directory {}", root_path);
            return Ok(StorageState::NonExistent);
        }

        self.lock()?;

        if intent == StartupOption::Format {
            return Ok(StorageState::NotFormatted);
        }
        if intent != StartupOption::Import {
            precheck(&*self)?;
        }

        let facts = self.facts();
        let state = classify(&facts).map_err(|reason| StorageError::inconsistent(&self.root, reason))?;
        debug!("Storage directory {} is in state {}", root_path, state);
        Ok(state)
    }

    /// Complete or undo the transition that `state` says was interrupted.
    pub fn do_recover(&self, state: StorageState) -> Result<(), StorageError> {
        let cur = self.current_dir();
        let root_path = display_path(&self.root);
        match state {
            StorageState::CompleteUpgrade => {
                info!("Completing previous upgrade for storage directory {}.", root_path);
                rename(&self.previous_tmp(), &self.previous_dir())?;
            }
            StorageState::RecoverUpgrade => {
                info!("Recovering storage directory {} from previous upgrade.", root_path);
                if cur.exists() {
                    delete_dir(&cur)?;
                }
                rename(&self.previous_tmp(), &cur)?;
            }
            StorageState::CompleteRollback => {
                info!("Completing previous rollback for storage directory {}.", root_path);
                delete_dir(&self.removed_tmp())?;
            }
            StorageState::RecoverRollback => {
                info!("Recovering storage directory {} from previous rollback.", root_path);
                rename(&self.removed_tmp(), &cur)?;
            }
            StorageState::CompleteFinalize => {
                info!("Completing previous finalize for storage directory {}.", root_path);
                delete_dir(&self.finalized_tmp())?;
            }
            StorageState::CompleteCheckpoint => {
                info!("Completing previous checkpoint for storage directory {}.", root_path);
                let prev_ckpt = self.previous_checkpoint();
                if prev_ckpt.exists() {
                    delete_dir(&prev_ckpt)?;
                }
                rename(&self.last_checkpoint_tmp(), &prev_ckpt)?;
            }
            StorageState::RecoverCheckpoint => {
                info!("Recovering storage directory {} from failed checkpoint.", root_path);
                if cur.exists() {
                    delete_dir(&cur)?;
                }
                rename(&self.last_checkpoint_tmp(), &cur)?;
            }
            other => {
                return Err(StorageError::UnexpectedState {
                    root: self.root.clone(),
                    state: other.to_string(),
                })
            }
        }
        fs_ops::sync_dir(&self.root)
    }

    /// Lock the directory for exclusive use. Already holding the lock is fine.
    pub fn lock(&mut self) -> Result<(), StorageError> {
        if self.lock.is_some() {
            return Ok(());
        }
        match self.try_lock()? {
            Some(lock) => {
                self.lock = Some(lock);
                Ok(())
            }
            None => {
                info!(
                    "Cannot lock storage {}. The directory is already locked.",
                    self.root.display()
                );
                Err(StorageError::LockUnavailable {
                    root: self.root.clone(),
                })
            }
        }
    }

    /// Attempt an independent exclusive lock without recording it on this directory.
    ///
    /// `Ok(None)` means someone else holds the lock, including this directory itself.
    pub fn try_lock(&self) -> Result<Option<DirLock>, StorageError> {
        DirLock::try_acquire(&self.lock_file())
    }

    /// Release the lock if held.
    pub fn unlock(&mut self) -> Result<(), StorageError> {
        match self.lock.take() {
            Some(lock) => lock.release(),
            None => Ok(()),
        }
    }
}

/// Whether this process may write under `path`, judged by the effective uid.
#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    match CString::new(path.as_os_str().as_bytes()) {
        Ok(c_path) => unsafe {
            libc::faccessat(libc::AT_FDCWD, c_path.as_ptr(), libc::W_OK, libc::AT_EACCESS) == 0
        },
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| !meta.permissions().readonly())
        .unwrap_or(false)
}
