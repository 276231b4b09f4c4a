//! Pre-upgrade poison marker
//!
//! Software that predates the `current/` layout looks for a single state file at the
//! directory root. Writing a deliberately corrupted file there (leading layout version,
//! an empty length-prefixed string, then explanatory text) makes that software refuse
//! to start against a directory it would otherwise damage.

use crate::error::StorageError;
use crate::types::LayoutVersion;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

const PRE_UPGRADE_MESSAGE: &str = "\nThis file is INTENTIONALLY CORRUPTED so that versions\n\
of this software prior to the current directory layout (which are incompatible\n\
with this directory layout) will fail to start.\n";

/// Create the poison marker at `path` unless it already exists.
pub fn write_pre_upgrade_marker(path: &Path, layout_version: LayoutVersion) -> Result<(), StorageError> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| StorageError::io(path, e))?;

    let mut bytes = Vec::with_capacity(6 + PRE_UPGRADE_MESSAGE.len());
    bytes.extend_from_slice(&layout_version.to_be_bytes());
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(PRE_UPGRADE_MESSAGE.as_bytes());
    file.write_all(&bytes).map_err(|e| StorageError::io(path, e))?;
    file.sync_all().map_err(|e| StorageError::io(path, e))
}

/// True when `path` holds state written by pre-layout software and must be converted.
///
/// A marker whose leading layout version is newer than `last_pre_upgrade` was written by
/// [`write_pre_upgrade_marker`] and needs nothing.
pub fn needs_conversion(path: &Path, last_pre_upgrade: LayoutVersion) -> Result<bool, StorageError> {
    if !path.exists() {
        return Ok(false);
    }
    let mut file = fs::File::open(path).map_err(|e| StorageError::io(path, e))?;
    let mut head = [0u8; 4];
    match file.read_exact(&mut head) {
        Ok(()) => Ok(i32::from_be_bytes(head) >= last_pre_upgrade),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(true),
        Err(e) => Err(StorageError::io(path, e)),
    }
}
