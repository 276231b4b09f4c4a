//! Whole-subtree filesystem transitions used by recovery and formatting.

use crate::error::StorageError;
use std::fs;
use std::path::Path;

/// Rename `from` to `to`. Fails if the rename cannot be done in one step.
pub fn rename(from: &Path, to: &Path) -> Result<(), StorageError> {
    fs::rename(from, to).map_err(|e| {
        StorageError::io(
            from,
            std::io::Error::new(
                e.kind(),
                format!("Failed to rename {} to {}: {}", from.display(), to.display(), e),
            ),
        )
    })
}

/// Delete a directory tree, or a single file if `path` is not a directory.
pub fn delete_dir(path: &Path) -> Result<(), StorageError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| StorageError::io(path, e))
}

/// Flush directory metadata so completed renames survive a crash.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    fs::File::open(dir)
        .and_then(|f| f.sync_all())
        .map_err(|e| StorageError::io(dir, e))
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<(), StorageError> {
    Ok(())
}

/// Canonical form of `path` for messages, falling back to `path` itself.
pub fn display_path(path: &Path) -> String {
    dunce::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
