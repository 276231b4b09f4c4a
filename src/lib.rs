//! NodeStore: Versioned Storage Directories
//!
//! Manages the on-disk storage directories of a storage node. Each directory holds a
//! `current/` area with a VERSION record, and may hold transient areas left behind by an
//! interrupted upgrade, rollback, finalize or checkpoint. On startup every directory is
//! classified, locked against concurrent use, and brought back to a consistent state
//! using only renames and deletes. The directories of one node form an aggregate that
//! must agree on role, namespace and layout version.

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod types;
pub mod version;

pub use error::{ApiError, ErrorKind, StorageError};
pub use storage::{PlainExtension, Storage, StorageDirectory, StorageExtension, StorageState};
pub use types::{DirType, LayoutVersion, NamespaceId, NodeRole, StartupOption};
pub use version::VersionRecord;
