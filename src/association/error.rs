//! Association error types.

use thiserror::Error;

use crate::association::policy::ViolationKind;
use crate::transaction::TransactionError;

/// Result type for association operations.
pub type AssocResult<T> = Result<T, AssociationError>;

/// Errors raised by cardinality rules and association sets.
#[derive(Debug, Error)]
pub enum AssociationError {
    /// A throw-policy cardinality violation.
    #[error("{kind} violates {rule}: {left} <-> {right}")]
    Violation {
        kind: ViolationKind,
        rule: String,
        left: String,
        right: String,
    },

    /// A dynamic bound could not be resolved against its source.
    #[error("cannot resolve bound #{accessor} of {rule}: {reason}")]
    BoundResolution {
        rule: String,
        accessor: String,
        reason: String,
    },

    /// A textual rule could not be parsed.
    #[error("invalid cardinality rule: {0:?}")]
    InvalidRule(String),

    /// Relation data refers to an entity the lookup does not know.
    #[error("relation data refers to unknown {side} id {id}")]
    UnknownId { side: &'static str, id: u64 },

    /// The internal batch transaction was misused.
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

impl AssociationError {
    /// Check if this error is a cardinality violation (including unresolvable
    /// dynamic bounds).
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            AssociationError::Violation { .. } | AssociationError::BoundResolution { .. }
        )
    }

    /// Check if this error means persisted relation data is unusable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, AssociationError::UnknownId { .. })
    }
}
