//! Transaction lifecycle states.
//!
//! A transaction starts under construction and moves exactly once to
//! committed or aborted. Only a committed reversible transaction may move on
//! to rolled back, and only once.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    /// Operations may still be appended.
    #[default]
    UnderConstruction,
    /// The pipeline ran to completion.
    Committed,
    /// The pipeline was discarded (or failed and was undone).
    Aborted,
    /// A committed pipeline was undone.
    RolledBack,
}

impl TxState {
    /// Check if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Aborted | TxState::RolledBack)
    }

    /// Check if the transition `self -> next` is allowed.
    pub fn can_transition_to(&self, next: TxState) -> bool {
        matches!(
            (self, next),
            (TxState::UnderConstruction, TxState::Committed)
                | (TxState::UnderConstruction, TxState::Aborted)
                | (TxState::Committed, TxState::RolledBack)
        )
    }

    /// Short lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::UnderConstruction => "under construction",
            TxState::Committed => "committed",
            TxState::Aborted => "aborted",
            TxState::RolledBack => "rolled back",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
