//! Bidirectional many-to-many associations with enforced cardinality.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   AssociationSet<L, R>                      │
//! │  (rules, policies, callbacks, atomic associate/disassociate)│
//! └─────────────────────────────────────────────────────────────┘
//!                 │                               │
//!                 ▼                               ▼
//!        ┌─────────────────┐             ┌─────────────────┐
//!        │ Relation<L, R>  │             │ CardinalityRule │
//!        │ (coupled index) │             │ forward/backward│
//!        └─────────────────┘             └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use relstore::association::{AssociationSet, OverflowPolicy};
//! use relstore::cardinality::CardinalityRule;
//!
//! let mut set = AssociationSet::new(
//!     "parents",
//!     CardinalityRule::zero_or_one("Father", "Mother"),
//!     CardinalityRule::zero_or_one("Mother", "Father"),
//! )
//! .with_overflow_policy(OverflowPolicy::Throw);
//!
//! assert!(set.associate("f1", "m1").unwrap());
//! assert!(set.associate("f1", "m2").is_err());
//! assert_eq!(set.associated_of_left(&"f1"), Some(vec!["m1"]));
//! ```

mod error;
mod policy;
mod relation;
mod set;

pub use error::{AssocResult, AssociationError};
pub use policy::{Callback, OverflowPolicy, UnderflowPolicy, Violation, ViolationKind};
pub use relation::Relation;
pub use set::AssociationSet;
