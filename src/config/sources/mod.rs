//! Configuration sources.

pub mod environment;
pub mod global_file;
