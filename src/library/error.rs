//! Library error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::association::AssociationError;
use crate::registry::EntityId;
use crate::store::StorageError;
use crate::transaction::TransactionError;

/// Result type for library operations.
pub type LibraryResult<T> = Result<T, LibraryError>;

/// Library errors.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("association error: {0}")]
    Association(#[from] AssociationError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("{kind} {id} is not part of this library")]
    UnknownEntity { kind: &'static str, id: EntityId },

    #[error("library not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LibraryError {
    /// Check if this error is a refused association.
    pub fn is_violation(&self) -> bool {
        matches!(self, LibraryError::Association(e) if e.is_violation())
    }

    /// Check if this error indicates the resource doesn't exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            LibraryError::NotFound(_) | LibraryError::UnknownEntity { .. } => true,
            LibraryError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}
