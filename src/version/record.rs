//! VersionRecord: the small versioned metadata file kept under `current/`.

use super::codec::{self, Properties};
use crate::error::{RecordError, StorageError};
use crate::types::{LayoutVersion, NamespaceId, NodeRole};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const KEY_LAYOUT_VERSION: &str = "layoutVersion";
pub const KEY_ROLE: &str = "role";
pub const KEY_NAMESPACE_ID: &str = "namespaceId";
pub const KEY_CTIME: &str = "cTime";

/// Keys used by older writers for the same fields
const LEGACY_KEY_ROLE: &str = "storageType";
const LEGACY_KEY_NAMESPACE_ID: &str = "namespaceID";

const COMMON_KEYS: [&str; 4] = [KEY_LAYOUT_VERSION, KEY_ROLE, KEY_NAMESPACE_ID, KEY_CTIME];

/// Caller-defined fields carried alongside the common ones.
pub type ExtraFields = BTreeMap<String, String>;

/// Decoded contents of a `VERSION` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub layout_version: LayoutVersion,
    pub role: NodeRole,
    pub namespace_id: NamespaceId,
    /// Creation time of the aggregate's formatting
    pub ctime: i64,
    pub extra: ExtraFields,
}

impl VersionRecord {
    pub fn new(
        layout_version: LayoutVersion,
        role: NodeRole,
        namespace_id: NamespaceId,
        ctime: i64,
    ) -> Self {
        Self {
            layout_version,
            role,
            namespace_id,
            ctime,
            extra: ExtraFields::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Decode from parsed properties. Every common key is required; everything else
    /// becomes an extension field.
    pub fn from_properties(mut props: Properties) -> Result<Self, RecordError> {
        let layout_version = take(&mut props, KEY_LAYOUT_VERSION, None)?;
        let role = take(&mut props, KEY_ROLE, Some(LEGACY_KEY_ROLE))?;
        let namespace_id = take(&mut props, KEY_NAMESPACE_ID, Some(LEGACY_KEY_NAMESPACE_ID))?;
        let ctime = take(&mut props, KEY_CTIME, None)?;

        Ok(Self {
            layout_version: parse_value(KEY_LAYOUT_VERSION, &layout_version)?,
            role: parse_value(KEY_ROLE, &role)?,
            namespace_id: parse_value(KEY_NAMESPACE_ID, &namespace_id)?,
            ctime: parse_value(KEY_CTIME, &ctime)?,
            extra: props,
        })
    }

    /// Encode to properties. Extension fields may not shadow a common key.
    pub fn to_properties(&self) -> Result<Properties, RecordError> {
        let mut props = Properties::new();
        for key in self.extra.keys() {
            if COMMON_KEYS.contains(&key.as_str())
                || key == LEGACY_KEY_ROLE
                || key == LEGACY_KEY_NAMESPACE_ID
            {
                return Err(RecordError::ReservedKey(key.clone()));
            }
        }
        props.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        props.insert(KEY_LAYOUT_VERSION.to_string(), self.layout_version.to_string());
        props.insert(KEY_ROLE.to_string(), self.role.as_tag().to_string());
        props.insert(KEY_NAMESPACE_ID.to_string(), self.namespace_id.to_string());
        props.insert(KEY_CTIME.to_string(), self.ctime.to_string());
        Ok(props)
    }

    pub fn decode(text: &str) -> Result<Self, RecordError> {
        Self::from_properties(codec::parse(text)?)
    }

    pub fn encode(&self) -> Result<String, RecordError> {
        codec::render(&self.to_properties()?, &COMMON_KEYS)
    }

    /// Read and decode a version file.
    ///
    /// Files that are not UTF-8 are read as ISO-8859-1, the encoding older writers used.
    pub fn read_from(path: &Path) -> Result<Self, StorageError> {
        let bytes = fs::read(path).map_err(|e| StorageError::io(path, e))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => e.into_bytes().into_iter().map(char::from).collect(),
        };
        Self::decode(&text).map_err(|source| StorageError::InvalidRecord {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the record atomically: temp file, fsync, rename over `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), StorageError> {
        let text = self.encode().map_err(|source| StorageError::InvalidRecord {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
            file.write_all(text.as_bytes())
                .map_err(|e| StorageError::io(&tmp, e))?;
            file.sync_all().map_err(|e| StorageError::io(&tmp, e))?;
        }
        crate::storage::fs_ops::rename(&tmp, path)?;
        if let Some(parent) = path.parent() {
            crate::storage::fs_ops::sync_dir(parent)?;
        }
        Ok(())
    }
}

fn take(
    props: &mut Properties,
    key: &'static str,
    legacy: Option<&'static str>,
) -> Result<String, RecordError> {
    let legacy_value = legacy.and_then(|k| props.remove(k));
    props
        .remove(key)
        .or(legacy_value)
        .ok_or(RecordError::MissingKey(key))
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, RecordError> {
    raw.trim().parse().map_err(|_| RecordError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}
