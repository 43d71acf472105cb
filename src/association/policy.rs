//! Violation policies and callbacks.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What to do when a removal would push an entity below its minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderflowPolicy {
    /// Refuse silently; only the callback reports it.
    #[default]
    Ignore,
    /// Refuse with a violation error.
    Throw,
    /// Remove the pair anyway and purge the underflowing entity from the
    /// relation entirely.
    RemoveAssociation,
}

/// What to do when an association would push an entity above its maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse silently; only the callback reports it.
    #[default]
    Ignore,
    /// Refuse with a violation error.
    Throw,
}

/// Which rule was violated, and in which direction.
///
/// Forward rules constrain the left entity's partner count, backward rules
/// the right entity's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    ForwardUnderflow,
    ForwardOverflow,
    BackwardUnderflow,
    BackwardOverflow,
}

impl ViolationKind {
    /// Check if this is a violation of the left side's rule.
    pub fn is_forward(&self) -> bool {
        matches!(self, ViolationKind::ForwardUnderflow | ViolationKind::ForwardOverflow)
    }

    /// Check if this is a minimum violation.
    pub fn is_underflow(&self) -> bool {
        matches!(self, ViolationKind::ForwardUnderflow | ViolationKind::BackwardUnderflow)
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::ForwardUnderflow => "forward underflow",
            ViolationKind::ForwardOverflow => "forward overflow",
            ViolationKind::BackwardUnderflow => "backward underflow",
            ViolationKind::BackwardOverflow => "backward overflow",
        };
        write!(f, "{s}")
    }
}

/// A refused or cascaded (de)association, handed to violation callbacks.
#[derive(Debug, Clone)]
pub struct Violation<L, R> {
    pub kind: ViolationKind,
    pub left: L,
    pub right: R,
    /// Diagnostic form of the violated rule.
    pub rule: String,
    /// True when the underflowing entity was purged from the relation.
    pub purged: bool,
}

/// Violation callback. Invoked after the relation has settled, so a callback
/// must not expect to observe a half-applied change.
pub type Callback<L, R> = Arc<dyn Fn(&Violation<L, R>) + Send + Sync>;

/// Per-side outcome of a cardinality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Accept,
    Ignore,
    Throw,
    Purge,
}

impl From<OverflowPolicy> for Verdict {
    fn from(policy: OverflowPolicy) -> Self {
        match policy {
            OverflowPolicy::Ignore => Verdict::Ignore,
            OverflowPolicy::Throw => Verdict::Throw,
        }
    }
}

impl From<UnderflowPolicy> for Verdict {
    fn from(policy: UnderflowPolicy) -> Self {
        match policy {
            UnderflowPolicy::Ignore => Verdict::Ignore,
            UnderflowPolicy::Throw => Verdict::Throw,
            UnderflowPolicy::RemoveAssociation => Verdict::Purge,
        }
    }
}
