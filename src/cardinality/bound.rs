//! Cardinality bounds.
//!
//! A bound is a fixed count, unlimited, or computed from the live source
//! instance by a named accessor closure supplied at configuration time.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::association::{AssocResult, AssociationError};

/// A named accessor computing a bound from the source instance.
///
/// Returning `Err` means the bound could not be resolved; the message ends up
/// in the violation error's diagnostic.
pub type Accessor<S> = Arc<dyn Fn(&S) -> Result<i64, String> + Send + Sync>;

/// One end of a cardinality rule.
pub enum Bound<S> {
    /// A literal, non-negative count.
    Fixed(usize),
    /// No limit (`*`).
    Unlimited,
    /// Resolved against the source instance at evaluation time. `accessor` is
    /// `None` when the name did not match any registered accessor.
    Dynamic {
        name: String,
        accessor: Option<Accessor<S>>,
    },
}

impl<S> Bound<S> {
    /// Create a dynamic bound from a closure.
    pub fn dynamic<F>(name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&S) -> Result<i64, String> + Send + Sync + 'static,
    {
        Bound::Dynamic {
            name: name.into(),
            accessor: Some(Arc::new(accessor)),
        }
    }

    /// Resolve to a concrete count; `None` means unlimited.
    pub(crate) fn resolve(&self, source: &S, rule: &str) -> AssocResult<Option<usize>> {
        match self {
            Bound::Fixed(n) => Ok(Some(*n)),
            Bound::Unlimited => Ok(None),
            Bound::Dynamic { name, accessor } => {
                let accessor = accessor.as_ref().ok_or_else(|| AssociationError::BoundResolution {
                    rule: rule.to_string(),
                    accessor: name.clone(),
                    reason: "no such accessor".to_string(),
                })?;
                let value = accessor(source).map_err(|reason| AssociationError::BoundResolution {
                    rule: rule.to_string(),
                    accessor: name.clone(),
                    reason,
                })?;
                usize::try_from(value)
                    .map(Some)
                    .map_err(|_| AssociationError::BoundResolution {
                        rule: rule.to_string(),
                        accessor: name.clone(),
                        reason: format!("negative bound {value}"),
                    })
            }
        }
    }
}

impl<S> Clone for Bound<S> {
    fn clone(&self) -> Self {
        match self {
            Bound::Fixed(n) => Bound::Fixed(*n),
            Bound::Unlimited => Bound::Unlimited,
            Bound::Dynamic { name, accessor } => Bound::Dynamic {
                name: name.clone(),
                accessor: accessor.clone(),
            },
        }
    }
}

// Structural: dynamic bounds compare by accessor name, never by closure identity.
impl<S> PartialEq for Bound<S> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Bound::Fixed(a), Bound::Fixed(b)) => a == b,
            (Bound::Unlimited, Bound::Unlimited) => true,
            (Bound::Dynamic { name: a, .. }, Bound::Dynamic { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl<S> Eq for Bound<S> {}

impl<S> Hash for Bound<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Bound::Fixed(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            Bound::Unlimited => 1u8.hash(state),
            Bound::Dynamic { name, .. } => {
                2u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl<S> fmt::Display for Bound<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Fixed(n) => write!(f, "{n}"),
            Bound::Unlimited => write!(f, "*"),
            Bound::Dynamic { name, .. } => write!(f, "#{name}"),
        }
    }
}

impl<S> fmt::Debug for Bound<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bound({self})")
    }
}

/// Named accessors that textual rules may refer to as `#name`.
pub struct Accessors<S> {
    by_name: HashMap<String, Accessor<S>>,
}

impl<S> Accessors<S> {
    /// Create an empty accessor table.
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
        }
    }

    /// Register an accessor under `name`.
    pub fn register<F>(mut self, name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&S) -> Result<i64, String> + Send + Sync + 'static,
    {
        self.by_name.insert(name.into(), Arc::new(accessor));
        self
    }

    /// Build a dynamic bound for `name`, resolved or not.
    pub(crate) fn bound(&self, name: &str) -> Bound<S> {
        Bound::Dynamic {
            name: name.to_string(),
            accessor: self.by_name.get(name).cloned(),
        }
    }
}

impl<S> Default for Accessors<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_literal_and_unlimited() {
        assert_eq!(Bound::<u32>::Fixed(3).resolve(&0, "r").unwrap(), Some(3));
        assert_eq!(Bound::<u32>::Unlimited.resolve(&0, "r").unwrap(), None);
    }

    #[test]
    fn test_resolve_dynamic() {
        let bound = Bound::dynamic("double", |s: &u32| Ok(i64::from(*s) * 2));
        assert_eq!(bound.resolve(&4, "r").unwrap(), Some(8));
    }

    #[test]
    fn test_resolve_failures_become_violations() {
        let failing = Bound::dynamic("broken", |_: &u32| Err("accessor threw".to_string()));
        let err = failing.resolve(&1, "A --> [0..#broken] B").unwrap_err();
        assert!(matches!(err, AssociationError::BoundResolution { .. }));
        assert!(err.to_string().contains("accessor threw"));

        let negative = Bound::dynamic("neg", |_: &u32| Ok(-1));
        assert!(negative.resolve(&1, "r").is_err());

        let missing = Accessors::<u32>::new().bound("absent");
        let err = missing.resolve(&1, "r").unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn test_structural_equality() {
        let a = Bound::dynamic("limit", |_: &u32| Ok(1));
        let b = Bound::dynamic("limit", |_: &u32| Ok(99));
        assert_eq!(a, b);
        assert_ne!(a, Bound::Fixed(1));
        assert_eq!(Bound::<u32>::Fixed(2), Bound::Fixed(2));
    }
}
