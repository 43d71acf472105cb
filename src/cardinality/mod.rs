//! Cardinality rules for associations.
//!
//! A rule answers two questions about one source entity: may it gain another
//! partner (`can_append`, checked against the upper bound) and may it lose one
//! (`can_remove`, checked against the lower bound). Bounds are literal,
//! unlimited, or computed from the live source through an injected closure.

mod bound;
mod rule;

pub use bound::{Accessor, Accessors, Bound};
pub use rule::CardinalityRule;
