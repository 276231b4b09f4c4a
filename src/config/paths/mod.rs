//! Filesystem locations used by configuration defaults.

pub mod xdg_root;
