//! Error types
//!
//! `StorageError` covers everything that can go wrong with a storage directory or the
//! aggregate that owns it. `ApiError` is the top-level error for callers that also load
//! configuration and initialise logging.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`StorageError`], used to pick an operator diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Directory contents violate the layout invariants. Never auto-repaired.
    InconsistentState,
    /// On-disk layout version cannot be used by this software.
    VersionIncompatible,
    /// Another live holder owns the directory lock.
    LockUnavailable,
    /// Underlying filesystem operation failed.
    Io,
    /// Caller broke an API contract (bad index, recovery of a non-recoverable state).
    Contract,
}

/// Failures decoding or encoding a version record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("required key '{0}' is missing")]
    MissingKey(&'static str),

    #[error("invalid value for '{key}': {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("malformed line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },

    #[error("extension key '{0}' is reserved or not representable")]
    ReservedKey(String),
}

/// Storage directory and aggregate errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Directory {root} is in an inconsistent state: {reason}")]
    InconsistentState { root: PathBuf, reason: String },

    #[error("Version file {path} is invalid: {source}")]
    InvalidRecord {
        path: PathBuf,
        #[source]
        source: RecordError,
    },

    #[error(
        "Upgrade is not supported from this older version of storage to the current version. \
         Old layout version is {}, and the latest layout version this software can upgrade \
         from is {min_supported}.",
        render_old_version(.old)
    )]
    VersionTooOld { old: i32, min_supported: i32 },

    #[error(
        "Unexpected version of storage directory {root}. Reported: {reported}. Expecting = {expected}."
    )]
    FutureVersion {
        root: PathBuf,
        reported: i32,
        expected: i32,
    },

    #[error("Cannot lock storage {root}. The directory is already locked.")]
    LockUnavailable { root: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected storage state for {root}: {state}")]
    UnexpectedState { root: PathBuf, state: String },

    #[error("No storage directory at index {index} ({count} configured)")]
    DirectoryIndex { index: usize, count: usize },

    #[error("{operation} failed for {} storage directories: {}", .failures.len(), Failures(.failures))]
    Aggregate {
        operation: &'static str,
        failures: Vec<(PathBuf, StorageError)>,
    },
}

fn render_old_version(old: &i32) -> String {
    if *old == 0 {
        "'too old'".to_string()
    } else {
        old.to_string()
    }
}

struct Failures<'a>(&'a [(PathBuf, StorageError)]);

impl fmt::Display for Failures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (root, err)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "[{}] {}", root.display(), err)?;
        }
        Ok(())
    }
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn inconsistent(root: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::InconsistentState {
            root: root.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error. An aggregate error takes the kind of its first failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::InconsistentState { .. } | StorageError::InvalidRecord { .. } => {
                ErrorKind::InconsistentState
            }
            StorageError::VersionTooOld { .. } | StorageError::FutureVersion { .. } => {
                ErrorKind::VersionIncompatible
            }
            StorageError::LockUnavailable { .. } => ErrorKind::LockUnavailable,
            StorageError::Io { .. } => ErrorKind::Io,
            StorageError::UnexpectedState { .. } | StorageError::DirectoryIndex { .. } => {
                ErrorKind::Contract
            }
            StorageError::Aggregate { failures, .. } => failures
                .first()
                .map(|(_, e)| e.kind())
                .unwrap_or(ErrorKind::Io),
        }
    }
}

/// Top-level error for configuration, logging and storage startup
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
