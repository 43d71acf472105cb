//! Reversible transaction pipeline.
//!
//! A pipeline has three stages: a supplier producing the object, zero or more
//! chained [`Operation`]s applied in order, and a terminal consumer (itself an
//! operation, e.g. "insert into registry and persist"). Committing runs the
//! stages front to back; rolling back runs the inverse of every applied stage
//! back to front, ending with the supplier's inverse.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::operation::Operation;
use crate::transaction::state::TxState;

/// Generate a fresh transaction identifier.
pub(crate) fn new_tx_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

/// The commit/abort state machine shared by every transaction kind.
pub trait Transaction {
    /// What a successful commit hands back.
    type Output;

    /// Unique transaction ID.
    fn id(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> TxState;

    /// Run the pipeline.
    fn commit(&mut self) -> TransactionResult<Self::Output>;

    /// Discard the pipeline without running it.
    fn abort(&mut self) -> TransactionResult<()>;

    /// Undo a committed pipeline. Unsupported unless overridden.
    fn rollback(&mut self) -> TransactionResult<()> {
        Err(TransactionError::RollbackUnsupported {
            tx_id: self.id().to_string(),
        })
    }
}

/// Transaction metadata for diagnostics.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    /// Unique transaction ID.
    pub tx_id: String,
    /// Human-readable label, e.g. `remove movie 3`.
    pub label: String,
    /// Lifecycle state.
    pub state: TxState,
    /// Number of chained operations (supplier and consumer excluded).
    pub operations: usize,
    /// When the transaction was built.
    pub started_at: DateTime<Utc>,
    /// When the transaction last changed state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransactionMetadata {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            tx_id: new_tx_id(),
            label: label.into(),
            state: TxState::UnderConstruction,
            operations: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn transition(&mut self, next: TxState) {
        debug_assert!(self.state.can_transition_to(next));
        self.state = next;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn ensure_under_construction(&self) -> TransactionResult<()> {
        if self.state == TxState::UnderConstruction {
            Ok(())
        } else {
            Err(TransactionError::NotUnderConstruction {
                tx_id: self.tx_id.clone(),
                state: self.state,
            })
        }
    }
}

type Produce<T> = Box<dyn FnMut() -> TransactionResult<Option<T>>>;
type Inverse<T> = Box<dyn FnMut(T) -> TransactionResult<T>>;

/// A transaction whose committed effects can be undone exactly once.
pub struct ReversibleTransaction<T> {
    metadata: TransactionMetadata,
    supplier: Produce<T>,
    supplier_inverse: Inverse<T>,
    operations: Vec<Box<dyn Operation<T>>>,
    consumer: Box<dyn Operation<T>>,
    value: Option<T>,
}

impl<T: Clone> ReversibleTransaction<T> {
    /// Create a transaction from its supplier (with inverse) and consumer.
    pub fn new<P, I, C>(label: impl Into<String>, supplier: P, supplier_inverse: I, consumer: C) -> Self
    where
        P: FnMut() -> TransactionResult<Option<T>> + 'static,
        I: FnMut(T) -> TransactionResult<T> + 'static,
        C: Operation<T> + 'static,
    {
        Self {
            metadata: TransactionMetadata::new(label),
            supplier: Box::new(supplier),
            supplier_inverse: Box::new(supplier_inverse),
            operations: Vec::new(),
            consumer: Box::new(consumer),
            value: None,
        }
    }

    /// Append a chained operation. Only legal while under construction.
    pub fn add_operation<O>(&mut self, op: O) -> TransactionResult<()>
    where
        O: Operation<T> + 'static,
    {
        self.metadata.ensure_under_construction()?;
        self.operations.push(Box::new(op));
        self.metadata.operations = self.operations.len();
        Ok(())
    }

    /// Builder form of [`ReversibleTransaction::add_operation`].
    pub fn with_operation<O>(mut self, op: O) -> TransactionResult<Self>
    where
        O: Operation<T> + 'static,
    {
        self.add_operation(op)?;
        Ok(self)
    }

    /// The object produced by a committed transaction.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Transaction metadata.
    pub fn metadata(&self) -> &TransactionMetadata {
        &self.metadata
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        &self.metadata.label
    }

    /// Names of the chained operations, in application order.
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    /// Run `backward` for the first `applied` operations in reverse, then the
    /// supplier inverse.
    fn unwind(&mut self, mut obj: T, applied: usize) -> TransactionResult<T> {
        for op in self.operations[..applied].iter_mut().rev() {
            obj = op.backward(obj)?;
        }
        (self.supplier_inverse)(obj)
    }

    /// Undo a partially applied commit and mark the transaction aborted.
    fn fail(&mut self, obj: T, applied: usize, cause: TransactionError) -> TransactionError {
        let outcome = self.unwind(obj, applied);
        self.metadata.transition(TxState::Aborted);
        match outcome {
            Ok(_) => {
                warn!(tx_id = %self.metadata.tx_id, label = %self.metadata.label, error = %cause, "transaction failed and was undone");
                cause
            }
            Err(undo) => {
                warn!(tx_id = %self.metadata.tx_id, error = %cause, undo_error = %undo, "transaction failed and could not be undone");
                TransactionError::Unrecoverable {
                    tx_id: self.metadata.tx_id.clone(),
                    cause: cause.to_string(),
                    undo: undo.to_string(),
                }
            }
        }
    }
}

impl<T: Clone> Transaction for ReversibleTransaction<T> {
    type Output = Option<T>;

    fn id(&self) -> &str {
        &self.metadata.tx_id
    }

    fn state(&self) -> TxState {
        self.metadata.state
    }

    /// Commit the transaction.
    ///
    /// Returns `None` only when the supplier produced no object. If a chained
    /// operation or the consumer fails, the stages already applied are undone
    /// and the transaction ends aborted.
    fn commit(&mut self) -> TransactionResult<Option<T>> {
        self.metadata.ensure_under_construction()?;

        let produced = match (self.supplier)() {
            Ok(produced) => produced,
            Err(e) => {
                self.metadata.transition(TxState::Aborted);
                return Err(e);
            }
        };

        let Some(mut obj) = produced else {
            self.metadata.transition(TxState::Committed);
            debug!(tx_id = %self.metadata.tx_id, label = %self.metadata.label, "supplier produced no object");
            return Ok(None);
        };

        for i in 0..self.operations.len() {
            let before = obj.clone();
            match self.operations[i].forward(obj) {
                Ok(next) => obj = next,
                Err(e) => return Err(self.fail(before, i, e)),
            }
        }

        let before = obj.clone();
        let obj = match self.consumer.forward(obj) {
            Ok(obj) => obj,
            Err(e) => {
                let applied = self.operations.len();
                return Err(self.fail(before, applied, e));
            }
        };

        self.value = Some(obj.clone());
        self.metadata.transition(TxState::Committed);
        debug!(
            tx_id = %self.metadata.tx_id,
            label = %self.metadata.label,
            operations = self.operations.len(),
            "transaction committed"
        );
        Ok(Some(obj))
    }

    fn abort(&mut self) -> TransactionResult<()> {
        self.metadata.ensure_under_construction()?;
        self.metadata.transition(TxState::Aborted);
        debug!(tx_id = %self.metadata.tx_id, label = %self.metadata.label, "transaction aborted");
        Ok(())
    }

    /// Roll back a committed transaction: consumer inverse, chained operations
    /// in reverse, supplier inverse.
    ///
    /// The rollback is spent even if an inverse stage fails: the transaction
    /// still ends rolled back and the failure is reported as
    /// [`TransactionError::Unrecoverable`], so a later call cannot pass
    /// without undoing anything.
    fn rollback(&mut self) -> TransactionResult<()> {
        if self.metadata.state != TxState::Committed {
            return Err(TransactionError::NotCommitted {
                tx_id: self.metadata.tx_id.clone(),
                state: self.metadata.state,
            });
        }

        if let Some(obj) = self.value.take() {
            let applied = self.operations.len();
            let undone = match self.consumer.backward(obj) {
                Ok(obj) => self.unwind(obj, applied),
                Err(e) => Err(e),
            };
            if let Err(undo) = undone {
                self.metadata.transition(TxState::RolledBack);
                warn!(tx_id = %self.metadata.tx_id, label = %self.metadata.label, error = %undo, "rollback failed part way");
                return Err(TransactionError::Unrecoverable {
                    tx_id: self.metadata.tx_id.clone(),
                    cause: "rollback requested".to_string(),
                    undo: undo.to_string(),
                });
            }
        }

        self.metadata.transition(TxState::RolledBack);
        debug!(tx_id = %self.metadata.tx_id, label = %self.metadata.label, "transaction rolled back");
        Ok(())
    }
}

impl<T> fmt::Debug for ReversibleTransaction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReversibleTransaction")
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::transaction::operation::operation;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// A pipeline over a counter that records every stage in a journal.
    fn counter_tx(journal: &Journal, start: i64) -> ReversibleTransaction<i64> {
        let j1 = journal.clone();
        let j2 = journal.clone();
        let j3 = journal.clone();
        let j4 = journal.clone();
        ReversibleTransaction::new(
            "counter",
            move || {
                j1.lock().push("supply".into());
                Ok(Some(start))
            },
            move |x| {
                j2.lock().push("unsupply".into());
                Ok(x)
            },
            operation(
                "consume",
                move |x| {
                    j3.lock().push(format!("consume {x}"));
                    Ok(x)
                },
                move |x| {
                    j4.lock().push(format!("unconsume {x}"));
                    Ok(x)
                },
            ),
        )
    }

    fn add(journal: &Journal, n: i64) -> impl Operation<i64> + 'static {
        let jf = journal.clone();
        let jb = journal.clone();
        operation(
            format!("add {n}"),
            move |x| {
                jf.lock().push(format!("+{n}"));
                Ok(x + n)
            },
            move |x| {
                jb.lock().push(format!("-{n}"));
                Ok(x - n)
            },
        )
    }

    #[test]
    fn test_commit_runs_stages_in_order() {
        let journal = Journal::default();
        let mut tx = counter_tx(&journal, 1);
        tx.add_operation(add(&journal, 2)).unwrap();
        tx.add_operation(add(&journal, 10)).unwrap();

        let result = tx.commit().unwrap();
        assert_eq!(result, Some(13));
        assert_eq!(tx.state(), TxState::Committed);
        assert_eq!(tx.value(), Some(&13));
        assert_eq!(*journal.lock(), vec!["supply", "+2", "+10", "consume 13"]);
    }

    #[test]
    fn test_rollback_runs_inverse_in_reverse() {
        let journal = Journal::default();
        let mut tx = counter_tx(&journal, 1)
            .with_operation(add(&journal, 2))
            .unwrap()
            .with_operation(add(&journal, 10))
            .unwrap();

        tx.commit().unwrap();
        journal.lock().clear();
        tx.rollback().unwrap();

        assert_eq!(tx.state(), TxState::RolledBack);
        assert_eq!(
            *journal.lock(),
            vec!["unconsume 13", "-10", "-2", "unsupply"]
        );
    }

    #[test]
    fn test_rollback_only_once_and_only_after_commit() {
        let journal = Journal::default();
        let mut tx = counter_tx(&journal, 0);

        let err = tx.rollback().unwrap_err();
        assert!(matches!(err, TransactionError::NotCommitted { .. }));

        tx.commit().unwrap();
        tx.rollback().unwrap();

        let err = tx.rollback().unwrap_err();
        assert!(matches!(
            err,
            TransactionError::NotCommitted { state: TxState::RolledBack, .. }
        ));
    }

    #[test]
    fn test_add_operation_after_commit_fails() {
        let journal = Journal::default();
        let mut tx = counter_tx(&journal, 0);
        tx.commit().unwrap();

        let err = tx.add_operation(add(&journal, 1)).unwrap_err();
        assert!(err.is_misuse());

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, TransactionError::NotUnderConstruction { .. }));
    }

    #[test]
    fn test_abort_discards_pipeline() {
        let journal = Journal::default();
        let mut tx = counter_tx(&journal, 0);
        tx.add_operation(add(&journal, 5)).unwrap();
        tx.abort().unwrap();

        assert_eq!(tx.state(), TxState::Aborted);
        assert!(journal.lock().is_empty());
        assert!(tx.add_operation(add(&journal, 1)).is_err());
        assert!(tx.commit().is_err());
        assert!(tx.rollback().is_err());
    }

    #[test]
    fn test_failing_operation_undoes_applied_stages() {
        let journal = Journal::default();
        let mut tx = counter_tx(&journal, 1);
        tx.add_operation(add(&journal, 2)).unwrap();
        tx.add_operation(operation(
            "explode",
            |_x: i64| Err(TransactionError::operation("explode", "boom")),
            Ok,
        ))
        .unwrap();

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, TransactionError::Operation { .. }));
        assert_eq!(tx.state(), TxState::Aborted);
        assert_eq!(*journal.lock(), vec!["supply", "+2", "-2", "unsupply"]);
    }

    #[test]
    fn test_failed_rollback_is_not_retried_silently() {
        let journal = Journal::default();
        let undo_calls = Arc::new(Mutex::new(0));
        let calls = undo_calls.clone();
        let j = journal.clone();
        let mut tx = ReversibleTransaction::new(
            "flaky",
            || Ok(Some(1i64)),
            move |x| {
                j.lock().push("unsupply".into());
                Ok(x)
            },
            operation("persist", Ok, move |_x: i64| {
                *calls.lock() += 1;
                Err(TransactionError::operation("persist", "disk full"))
            }),
        );
        tx.commit().unwrap();

        let err = tx.rollback().unwrap_err();
        assert!(matches!(err, TransactionError::Unrecoverable { .. }));
        assert!(err.to_string().contains("disk full"));
        assert_eq!(tx.state(), TxState::RolledBack);
        assert_eq!(tx.value(), None);

        let err = tx.rollback().unwrap_err();
        assert!(err.is_misuse());
        assert_eq!(*undo_calls.lock(), 1);
        assert!(journal.lock().is_empty());
    }

    #[test]
    fn test_empty_supplier_commits_without_value() {
        let mut tx: ReversibleTransaction<i64> = ReversibleTransaction::new(
            "nothing",
            || Ok(None),
            Ok,
            operation("consume", Ok, Ok),
        );
        assert_eq!(tx.commit().unwrap(), None);
        assert_eq!(tx.state(), TxState::Committed);
        tx.rollback().unwrap();
        assert_eq!(tx.state(), TxState::RolledBack);
    }
}
