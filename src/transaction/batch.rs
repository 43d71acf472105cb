//! Abort-only transactions.
//!
//! A [`Batch`] queues plain steps and either runs all of them on commit or
//! none of them on abort. The association engine uses it so that a two-sided
//! cardinality check applies neither side's effect unless both sides agree.

use std::fmt;

use tracing::trace;

use crate::transaction::context::{Transaction, TransactionMetadata};
use crate::transaction::error::TransactionResult;
use crate::transaction::state::TxState;

type Step<'a> = Box<dyn FnOnce() + 'a>;

/// An ordered list of steps with commit/abort semantics and no rollback.
pub struct Batch<'a> {
    metadata: TransactionMetadata,
    steps: Vec<(String, Step<'a>)>,
}

impl<'a> Batch<'a> {
    /// Create an empty batch.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            metadata: TransactionMetadata::new(label),
            steps: Vec::new(),
        }
    }

    /// Queue a step. Only legal while under construction.
    pub fn add_step<F>(&mut self, name: impl Into<String>, step: F) -> TransactionResult<()>
    where
        F: FnOnce() + 'a,
    {
        self.metadata.ensure_under_construction()?;
        self.steps.push((name.into(), Box::new(step)));
        self.metadata.operations = self.steps.len();
        Ok(())
    }

    /// Number of queued steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if no step is queued.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Transaction for Batch<'_> {
    /// Number of steps that ran.
    type Output = usize;

    fn id(&self) -> &str {
        &self.metadata.tx_id
    }

    fn state(&self) -> TxState {
        self.metadata.state
    }

    fn commit(&mut self) -> TransactionResult<usize> {
        self.metadata.ensure_under_construction()?;
        let steps = std::mem::take(&mut self.steps);
        let count = steps.len();
        for (name, step) in steps {
            trace!(tx_id = %self.metadata.tx_id, step = %name, "running batch step");
            step();
        }
        self.metadata.transition(TxState::Committed);
        Ok(count)
    }

    fn abort(&mut self) -> TransactionResult<()> {
        self.metadata.ensure_under_construction()?;
        self.steps.clear();
        self.metadata.transition(TxState::Aborted);
        Ok(())
    }
}

impl fmt::Debug for Batch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("metadata", &self.metadata)
            .field("steps", &self.steps.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::transaction::TransactionError;

    #[test]
    fn test_commit_runs_steps_in_order() {
        let log = RefCell::new(Vec::new());
        let mut batch = Batch::new("ordered");
        batch.add_step("first", || log.borrow_mut().push(1)).unwrap();
        batch.add_step("second", || log.borrow_mut().push(2)).unwrap();

        assert_eq!(batch.commit().unwrap(), 2);
        assert_eq!(batch.state(), TxState::Committed);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_abort_runs_nothing() {
        let log = RefCell::new(Vec::new());
        let mut batch = Batch::new("discarded");
        batch.add_step("first", || log.borrow_mut().push(1)).unwrap();
        batch.abort().unwrap();

        assert_eq!(batch.state(), TxState::Aborted);
        assert!(log.borrow().is_empty());
        assert!(batch.add_step("late", || {}).is_err());
    }

    #[test]
    fn test_rollback_unsupported() {
        let mut batch = Batch::new("no undo");
        batch.commit().unwrap();
        let err = batch.rollback().unwrap_err();
        assert!(matches!(err, TransactionError::RollbackUnsupported { .. }));
        assert!(err.is_misuse());
    }

    #[test]
    fn test_double_commit_is_misuse() {
        let mut batch = Batch::new("twice");
        batch.commit().unwrap();
        assert!(batch.commit().unwrap_err().is_misuse());
    }
}
