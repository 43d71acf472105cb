//! Transaction framework for relstore.
//!
//! Every mutation of the registries and association sets runs inside a
//! transaction. Two kinds exist:
//!
//! - [`ReversibleTransaction`]: supplier → chained operations → consumer, with
//!   a one-shot `rollback` that replays every inverse in reverse order.
//! - [`Batch`]: plain steps with commit/abort only, used to make two-sided
//!   checks atomic.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 ReversibleTransaction<T>                     │
//! │   supplier ──▶ op₁ ──▶ op₂ ──▶ … ──▶ consumer   (commit)    │
//! │   supplier⁻¹ ◀── op₁⁻¹ ◀── op₂⁻¹ ◀── … ◀── consumer⁻¹ (rollback) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use relstore::transaction::{operation, ReversibleTransaction, Transaction};
//!
//! let mut tx = ReversibleTransaction::new(
//!     "counter",
//!     || Ok(Some(1)),
//!     Ok,
//!     operation("consume", Ok, Ok),
//! );
//! tx.add_operation(operation("add two", |x: i32| Ok(x + 2), |x: i32| Ok(x - 2))).unwrap();
//!
//! assert_eq!(tx.commit().unwrap(), Some(3));
//! tx.rollback().unwrap();
//! ```
//!
//! Transactions are synchronous and single-session: nothing here suspends,
//! times out or coordinates with other threads.

mod batch;
mod context;
mod error;
mod operation;
mod state;

pub use batch::Batch;
pub use context::{ReversibleTransaction, Transaction, TransactionMetadata};
pub use error::{TransactionError, TransactionResult};
pub use operation::{operation, FnOperation, Operation};
pub use state::TxState;
