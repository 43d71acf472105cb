//! Transaction error types.

use thiserror::Error;

use crate::transaction::state::TxState;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
///
/// The first group are programmer errors (misuse of the lifecycle). They are
/// raised synchronously and are never a data condition worth retrying.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// An operation was appended, or a commit/abort attempted, after the
    /// transaction left the construction state.
    #[error("transaction {tx_id} is no longer under construction (state: {state})")]
    NotUnderConstruction { tx_id: String, state: TxState },

    /// Rollback was requested before the transaction committed.
    #[error("transaction {tx_id} cannot be rolled back from state {state}")]
    NotCommitted { tx_id: String, state: TxState },

    /// The transaction kind has no inverse pipeline.
    #[error("transaction {tx_id} does not support rollback")]
    RollbackUnsupported { tx_id: String },

    /// A stage of the pipeline failed.
    #[error("operation `{operation}` failed: {reason}")]
    Operation { operation: String, reason: String },

    /// A stage failed and undoing the already-applied stages failed as well,
    /// or an inverse stage failed during rollback.
    #[error("transaction {tx_id} failed ({cause}) and could not be fully undone: {undo}")]
    Unrecoverable {
        tx_id: String,
        cause: String,
        undo: String,
    },
}

impl TransactionError {
    /// Check if this error is a lifecycle misuse rather than a data condition.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            TransactionError::NotUnderConstruction { .. }
                | TransactionError::NotCommitted { .. }
                | TransactionError::RollbackUnsupported { .. }
        )
    }

    /// Wrap any displayable failure as a stage error.
    pub fn operation(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Operation {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}
