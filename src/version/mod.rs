//! Version Records
//!
//! Each storage directory carries a `current/VERSION` file with the layout version,
//! node role, namespace id and creation time of the aggregate, plus any fields the
//! owning layer adds.

pub mod codec;
pub mod record;

pub use record::{ExtraFields, VersionRecord};
