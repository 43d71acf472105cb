//! Store groups: the persistence strategy for one entity class.
//!
//! A group fixes the subdirectory, the deterministic file name of an object
//! (rewriting the same logical object overwrites its file), and the codec.
//! Deserialization never fails loudly: a corrupted file reads as absent.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::error::{StorageError, StorageResult};

type NameFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;
type EncodeFn<T> = Arc<dyn Fn(&T) -> StorageResult<Vec<u8>> + Send + Sync>;
type DecodeFn<T> = Arc<dyn Fn(&[u8]) -> Option<T> + Send + Sync>;

/// Persistence strategy for objects of type `T`.
pub struct StoreGroup<T> {
    name: String,
    subdir: String,
    name_of: NameFn<T>,
    serialize: EncodeFn<T>,
    deserialize: DecodeFn<T>,
}

impl<T> StoreGroup<T> {
    /// Create a group from explicit naming and codec functions.
    pub fn new<N, S, D>(name: impl Into<String>, subdir: impl Into<String>, name_of: N, serialize: S, deserialize: D) -> Self
    where
        N: Fn(&T) -> String + Send + Sync + 'static,
        S: Fn(&T) -> StorageResult<Vec<u8>> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Option<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            subdir: subdir.into(),
            name_of: Arc::new(name_of),
            serialize: Arc::new(serialize),
            deserialize: Arc::new(deserialize),
        }
    }

    /// Create a group with a pretty-printed JSON codec.
    pub fn json<N>(name: impl Into<String>, subdir: impl Into<String>, name_of: N) -> Self
    where
        T: Serialize + DeserializeOwned,
        N: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self::new(
            name,
            subdir,
            name_of,
            |obj: &T| serde_json::to_vec_pretty(obj).map_err(StorageError::from),
            |bytes: &[u8]| serde_json::from_slice(bytes).ok(),
        )
    }

    /// Group name (the class token used in the name index).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subdirectory under the store home.
    pub fn subdir(&self) -> &str {
        &self.subdir
    }

    /// Deterministic file name of `obj`.
    pub fn name_of(&self, obj: &T) -> String {
        (self.name_of)(obj)
    }

    pub(crate) fn serialize(&self, obj: &T) -> StorageResult<Vec<u8>> {
        (self.serialize)(obj)
    }

    pub(crate) fn deserialize(&self, bytes: &[u8]) -> Option<T> {
        (self.deserialize)(bytes)
    }
}

impl<T> Clone for StoreGroup<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            subdir: self.subdir.clone(),
            name_of: self.name_of.clone(),
            serialize: self.serialize.clone(),
            deserialize: self.deserialize.clone(),
        }
    }
}

impl<T> fmt::Debug for StoreGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreGroup")
            .field("name", &self.name)
            .field("subdir", &self.subdir)
            .finish()
    }
}

/// Validate an object, group or directory name.
///
/// Names become single path components, so they are restricted to prevent
/// path traversal:
/// - 1-128 characters
/// - alphanumeric, underscores, hyphens and dots only
/// - not `.` or `..`
pub(crate) fn validate_name(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name.len() > 128 {
        return Err(invalid("name too long"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name cannot be a relative path component"));
    }
    for (i, c) in name.chars().enumerate() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' {
            return Err(invalid(&format!("invalid character '{c}' at position {i}")));
        }
    }
    Ok(())
}
