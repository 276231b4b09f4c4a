//! Advisory directory lock
//!
//! A storage directory is locked by taking an exclusive, non-blocking `flock` on a
//! zero-length sentinel file at its root. The lock belongs to the open file, so two
//! independent attempts exclude each other even inside one process. Dropping the guard
//! releases the lock and closes the file.

use crate::error::StorageError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Sentinel file name at the root of every storage directory
pub const LOCK_FILE_NAME: &str = "in_use.lock";

/// Held exclusive lock on a storage directory
#[derive(Debug)]
pub struct DirLock {
    file: Option<File>,
    path: PathBuf,
}

impl DirLock {
    /// Try to lock `path`, creating the sentinel if absent.
    ///
    /// Returns `Ok(None)` when another holder owns the lock. Other failures are errors.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| StorageError::io(path, e))?;

        match try_lock_exclusive(&file) {
            Ok(true) => Ok(Some(Self {
                file: Some(file),
                path: path.to_path_buf(),
            })),
            Ok(false) => Ok(None),
            Err(e) => {
                tracing::info!("Failed to lock {}: {}", path.display(), e);
                Err(StorageError::io(path, e))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock and close the sentinel, reporting any unlock failure.
    pub fn release(mut self) -> Result<(), StorageError> {
        match self.file.take() {
            Some(file) => unlock(&file).map_err(|e| StorageError::io(&self.path, e)),
            None => Ok(()),
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = unlock(&file) {
                tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn unlock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

// No advisory locking off unix; every attempt succeeds and `is_lock_supported` reports it.
#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> std::io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> std::io::Result<()> {
    Ok(())
}
