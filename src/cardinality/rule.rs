//! Cardinality rules.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::association::{AssocResult, AssociationError};
use crate::cardinality::bound::{Accessors, Bound};

/// Governs how many partners one source entity may have on the target side.
///
/// Displayed as `"<Source> --> [<min>..<max or *>] <Target>"`.
pub struct CardinalityRule<S> {
    source: String,
    target: String,
    min: Bound<S>,
    max: Bound<S>,
}

impl<S> CardinalityRule<S> {
    /// Create a rule from literal bounds; `max = None` means unlimited.
    ///
    /// Any negative literal turns the whole rule into `0..*`.
    pub fn new(source: impl Into<String>, target: impl Into<String>, min: i64, max: Option<i64>) -> Self {
        let negative = min < 0 || max.is_some_and(|m| m < 0);
        let (min, max) = if negative {
            (Bound::Fixed(0), Bound::Unlimited)
        } else {
            (
                Bound::Fixed(min as usize),
                max.map_or(Bound::Unlimited, |m| Bound::Fixed(m as usize)),
            )
        };
        Self::with_bounds(source, target, min, max)
    }

    /// Create a rule from arbitrary bounds.
    pub fn with_bounds(source: impl Into<String>, target: impl Into<String>, min: Bound<S>, max: Bound<S>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            min,
            max,
        }
    }

    /// `0..1`
    pub fn zero_or_one(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, 0, Some(1))
    }

    /// `0..*`
    pub fn zero_or_more(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, 0, None)
    }

    /// `1..*`
    pub fn one_or_more(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, 1, None)
    }

    /// Parse a textual rule such as `0..1`, `1..*` or `0..#limit`.
    ///
    /// `#name` bounds are looked up in `accessors`; an unknown name is only
    /// reported when the rule is evaluated.
    pub fn parse(
        source: impl Into<String>,
        target: impl Into<String>,
        expr: &str,
        accessors: &Accessors<S>,
    ) -> AssocResult<Self> {
        let (lo, hi) = expr
            .trim()
            .split_once("..")
            .ok_or_else(|| AssociationError::InvalidRule(expr.to_string()))?;

        let mut negative = false;
        let mut parse_bound = |text: &str| -> AssocResult<Bound<S>> {
            let text = text.trim();
            if text == "*" {
                return Ok(Bound::Unlimited);
            }
            if let Some(name) = text.strip_prefix('#') {
                if name.is_empty() {
                    return Err(AssociationError::InvalidRule(expr.to_string()));
                }
                return Ok(accessors.bound(name));
            }
            let value: i64 = text
                .parse()
                .map_err(|_| AssociationError::InvalidRule(expr.to_string()))?;
            if value < 0 {
                negative = true;
                return Ok(Bound::Fixed(0));
            }
            Ok(Bound::Fixed(value as usize))
        };

        let min = parse_bound(lo)?;
        let max = parse_bound(hi)?;
        if negative {
            return Ok(Self::with_bounds(source, target, Bound::Fixed(0), Bound::Unlimited));
        }
        Ok(Self::with_bounds(source, target, min, max))
    }

    /// Source type name.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Target type name.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Lower bound.
    pub fn min(&self) -> &Bound<S> {
        &self.min
    }

    /// Upper bound.
    pub fn max(&self) -> &Bound<S> {
        &self.max
    }

    /// Check if `source`, currently holding `count` partners, may gain one.
    pub fn can_append(&self, source: &S, count: usize) -> AssocResult<bool> {
        match self.max.resolve(source, &self.to_string())? {
            Some(upper) => Ok(count < upper),
            None => Ok(true),
        }
    }

    /// Check if `source`, currently holding `count` partners, may lose one.
    pub fn can_remove(&self, source: &S, count: usize) -> AssocResult<bool> {
        match self.min.resolve(source, &self.to_string())? {
            Some(lower) => Ok(count > lower),
            // an unlimited minimum can never be satisfied by removing
            None => Ok(false),
        }
    }
}

impl<S> Clone for CardinalityRule<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            target: self.target.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
        }
    }
}

impl<S> PartialEq for CardinalityRule<S> {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.min == other.min
            && self.max == other.max
    }
}

impl<S> Eq for CardinalityRule<S> {}

impl<S> Hash for CardinalityRule<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.target.hash(state);
        self.min.hash(state);
        self.max.hash(state);
    }
}

impl<S> fmt::Display for CardinalityRule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> [{}..{}] {}", self.source, self.min, self.max, self.target)
    }
}

impl<S> fmt::Debug for CardinalityRule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardinalityRule({self})")
    }
}
