//! Storage Directories
//!
//! Local, versioned, crash-recoverable directories for a storage node, and the
//! aggregate that keeps several of them in agreement.

pub mod aggregate;
pub mod directory;
pub mod extension;
pub mod fs_ops;
pub mod legacy;
pub mod lock;
pub mod state;

pub use aggregate::{DirectoryStatus, LayoutVersions, StartupReport, Storage, StorageInfo};
pub use directory::StorageDirectory;
pub use extension::{PlainExtension, StorageExtension};
pub use lock::DirLock;
pub use state::{DirectoryFacts, StorageState};
