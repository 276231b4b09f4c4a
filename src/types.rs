//! Core types shared by storage directories, version records and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Layout version: more negative means a newer on-disk format.
pub type LayoutVersion = i32;

/// Namespace identifier. Zero means "not yet known".
pub type NamespaceId = i32;

/// Layout version written by this software when nothing else is configured.
pub const DEFAULT_LAYOUT_VERSION: LayoutVersion = -18;

/// Oldest layout version this software knows how to upgrade from.
pub const LAST_UPGRADABLE_LAYOUT_VERSION: LayoutVersion = -7;

/// Last layout version that predates the `current/`-style directory layout.
pub const LAST_PRE_UPGRADE_LAYOUT_VERSION: LayoutVersion = -3;

/// Kind of node that owns a storage aggregate. Rendered as a discrete tag on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    NameNode,
    DataNode,
}

impl NodeRole {
    /// Tag written to the `role` key of a version record
    pub fn as_tag(&self) -> &'static str {
        match self {
            NodeRole::NameNode => "NAME_NODE",
            NodeRole::DataNode => "DATA_NODE",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NAME_NODE" => Ok(NodeRole::NameNode),
            "DATA_NODE" => Ok(NodeRole::DataNode),
            other => Err(format!("unknown node role tag: {}", other)),
        }
    }
}

/// Startup intent supplied by the owning process.
///
/// Only `Format` and `Import` change how directories are analyzed; the rest are consumed
/// by the owning layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupOption {
    Format,
    Regular,
    Import,
    Upgrade,
    Rollback,
    Finalize,
}

impl Default for StartupOption {
    fn default() -> Self {
        StartupOption::Regular
    }
}

/// Directory capability mask used to select subsets of an aggregate.
///
/// A directory of type `IMAGE | EDITS` is of type `IMAGE` and of type `EDITS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirType(pub u32);

impl DirType {
    pub const fn new(bits: u32) -> Self {
        DirType(bits)
    }

    pub const fn union(self, other: DirType) -> Self {
        DirType(self.0 | other.0)
    }

    /// True when this directory type covers every capability of `other`
    pub fn is_of_type(&self, other: DirType) -> bool {
        self.0 & other.0 == other.0
    }
}
