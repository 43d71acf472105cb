//! The coupled two-index relation.
//!
//! Both indices live in one structure and are only ever mutated together, so
//! `(l, r)` is reachable from the left index iff it is reachable from the
//! right index. An entity can be *known* with zero partners (its key stays
//! after its last pair is removed) or *unknown* (never seen, or purged).

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// A symmetric many-to-many set of `(left, right)` pairs.
#[derive(Debug, Clone)]
pub struct Relation<L, R> {
    left: HashMap<L, Vec<R>>,
    right: HashMap<R, Vec<L>>,
}

impl<L, R> Default for Relation<L, R> {
    fn default() -> Self {
        Self {
            left: HashMap::new(),
            right: HashMap::new(),
        }
    }
}

impl<L, R> Relation<L, R>
where
    L: Clone + Eq + Hash,
    R: Clone + Eq + Hash,
{
    /// Create an empty relation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair; returns false if it was already present.
    pub fn insert(&mut self, l: L, r: R) -> bool {
        if self.contains(&l, &r) {
            return false;
        }
        self.left.entry(l.clone()).or_default().push(r.clone());
        self.right.entry(r).or_default().push(l);
        true
    }

    /// Remove a pair; both entities stay known. Returns false if absent.
    pub fn remove(&mut self, l: &L, r: &R) -> bool {
        if !self.contains(l, r) {
            return false;
        }
        if let Some(partners) = self.left.get_mut(l) {
            partners.retain(|x| x != r);
        }
        if let Some(partners) = self.right.get_mut(r) {
            partners.retain(|x| x != l);
        }
        true
    }

    /// Forget a left entity and every pair it takes part in.
    pub fn purge_left(&mut self, l: &L) -> Vec<R> {
        let partners = self.left.remove(l).unwrap_or_default();
        for r in &partners {
            if let Some(back) = self.right.get_mut(r) {
                back.retain(|x| x != l);
            }
        }
        partners
    }

    /// Forget a right entity and every pair it takes part in.
    pub fn purge_right(&mut self, r: &R) -> Vec<L> {
        let partners = self.right.remove(r).unwrap_or_default();
        for l in &partners {
            if let Some(back) = self.left.get_mut(l) {
                back.retain(|x| x != r);
            }
        }
        partners
    }

    /// Make a left entity known without giving it partners.
    pub fn track_left(&mut self, l: L) {
        self.left.entry(l).or_default();
    }

    /// Make a right entity known without giving it partners.
    pub fn track_right(&mut self, r: R) {
        self.right.entry(r).or_default();
    }

    /// Check if a pair is present.
    pub fn contains(&self, l: &L, r: &R) -> bool {
        self.left.get(l).is_some_and(|partners| partners.contains(r))
    }

    /// Partners of a left entity; `None` if unknown.
    pub fn partners_of_left(&self, l: &L) -> Option<&[R]> {
        self.left.get(l).map(Vec::as_slice)
    }

    /// Partners of a right entity; `None` if unknown.
    pub fn partners_of_right(&self, r: &R) -> Option<&[L]> {
        self.right.get(r).map(Vec::as_slice)
    }

    /// Partner count of a left entity (zero if unknown).
    pub fn left_count(&self, l: &L) -> usize {
        self.left.get(l).map_or(0, Vec::len)
    }

    /// Partner count of a right entity (zero if unknown).
    pub fn right_count(&self, r: &R) -> usize {
        self.right.get(r).map_or(0, Vec::len)
    }

    /// Known left entities.
    pub fn lefts(&self) -> impl Iterator<Item = &L> {
        self.left.keys()
    }

    /// Known right entities.
    pub fn rights(&self) -> impl Iterator<Item = &R> {
        self.right.keys()
    }

    /// Every pair, in no particular order.
    pub fn pairs(&self) -> Vec<(L, R)> {
        self.left
            .iter()
            .flat_map(|(l, rs)| rs.iter().map(move |r| (l.clone(), r.clone())))
            .collect()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.left.values().map(Vec::len).sum()
    }

    /// Check if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every pair and forget every entity.
    pub fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    /// Verify that both indices describe the same pairs.
    pub fn is_symmetric(&self) -> bool {
        let from_left = self.left.values().map(Vec::len).sum::<usize>();
        let from_right = self.right.values().map(Vec::len).sum::<usize>();
        from_left == from_right
            && self.left.iter().all(|(l, rs)| {
                rs.iter()
                    .all(|r| self.right.get(r).is_some_and(|ls| ls.contains(l)))
            })
    }
}

fn same_partners<K, V>(a: &HashMap<K, Vec<V>>, b: &HashMap<K, Vec<V>>) -> bool
where
    K: Eq + Hash,
    V: Eq + Hash,
{
    a.len() == b.len()
        && a.iter().all(|(k, vs)| {
            b.get(k).is_some_and(|other| {
                vs.len() == other.len()
                    && vs.iter().collect::<HashSet<_>>() == other.iter().collect::<HashSet<_>>()
            })
        })
}

// Set semantics: partner order is irrelevant, known-but-empty entities count.
impl<L, R> PartialEq for Relation<L, R>
where
    L: Eq + Hash,
    R: Eq + Hash,
{
    fn eq(&self, other: &Self) -> bool {
        same_partners(&self.left, &other.left) && same_partners(&self.right, &other.right)
    }
}

impl<L: Eq + Hash, R: Eq + Hash> Eq for Relation<L, R> {}
