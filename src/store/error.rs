//! Store layer error types
//!
//! All errors that can occur during store operations are defined here.
//! Delete-path I/O failures never show up here: they are logged and swallowed.

use std::path::PathBuf;

use thiserror::Error;

/// the main error type for store operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// no store group is registered for the runtime type being persisted
    #[error("no store group registered for type {0}")]
    GroupNotRegistered(String),

    /// a creation transaction produced no object
    #[error("creation of {0} produced no object")]
    NoObject(String),

    /// an object name is not usable as a file name
    #[error("invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// copy destination already holds data or an open store
    #[error("destination already occupied: {0}")]
    DestinationOccupied(PathBuf),

    /// copy source and destination are the same directory
    #[error("cannot copy a store onto itself: {0}")]
    SameLocation(PathBuf),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// a custom codec rejected an object
    #[error("codec error in group {group}: {reason}")]
    Codec { group: String, reason: String },

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// the home directory does not exist and creation was not requested
    #[error("store not found: {0}")]
    NotFound(PathBuf),
}

impl StorageError {
    /// check if this error is a wiring mistake rather than a data condition
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StorageError::GroupNotRegistered(_) | StorageError::NoObject(_)
        )
    }

    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound(_) => true,
            StorageError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// result type alias for store operations
pub type StorageResult<T> = Result<T, StorageError>;
