//! Bidirectional association sets with enforced cardinality.
//!
//! Each `associate`/`disassociate` call evaluates the forward rule (left
//! entity) and the backward rule (right entity), maps each failed check to a
//! verdict through the configured policy, and applies the change inside one
//! [`Batch`] so that neither side's effect lands unless both sides accept:
//!
//! | forward | backward | result |
//! |---|---|---|
//! | ok | ok | commit |
//! | ok | ignore | abort, backward callback |
//! | ignore | ok | abort, forward callback |
//! | ignore | ignore | abort, both callbacks |
//! | any | throw (or vice versa) | violation error, no change |
//!
//! Callbacks run after the relation has settled.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, info};

use crate::association::error::{AssocResult, AssociationError};
use crate::association::policy::{Callback, OverflowPolicy, UnderflowPolicy, Verdict, Violation, ViolationKind};
use crate::association::relation::Relation;
use crate::cardinality::CardinalityRule;
use crate::transaction::{Batch, Transaction};

/// A symmetric many-to-many relation between two entity collections.
pub struct AssociationSet<L, R> {
    name: String,
    relation: Relation<L, R>,
    forward: CardinalityRule<L>,
    backward: CardinalityRule<R>,
    underflow: UnderflowPolicy,
    overflow: OverflowPolicy,
    callbacks: HashMap<ViolationKind, Callback<L, R>>,
}

impl<L, R> AssociationSet<L, R>
where
    L: Clone + Eq + Hash + fmt::Debug,
    R: Clone + Eq + Hash + fmt::Debug,
{
    /// Create an empty association set governed by `forward` (left side) and
    /// `backward` (right side). Both policies default to ignore.
    pub fn new(name: impl Into<String>, forward: CardinalityRule<L>, backward: CardinalityRule<R>) -> Self {
        Self {
            name: name.into(),
            relation: Relation::new(),
            forward,
            backward,
            underflow: UnderflowPolicy::default(),
            overflow: OverflowPolicy::default(),
            callbacks: HashMap::new(),
        }
    }

    /// Builder: set the underflow policy.
    pub fn with_underflow_policy(mut self, policy: UnderflowPolicy) -> Self {
        self.underflow = policy;
        self
    }

    /// Builder: set the overflow policy.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    // ==================== Configuration ====================

    /// Relation name, used in logs and persistence.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn forward_rule(&self) -> &CardinalityRule<L> {
        &self.forward
    }

    pub fn backward_rule(&self) -> &CardinalityRule<R> {
        &self.backward
    }

    pub fn underflow_policy(&self) -> UnderflowPolicy {
        self.underflow
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn set_underflow_policy(&mut self, policy: UnderflowPolicy) {
        self.underflow = policy;
    }

    pub fn set_overflow_policy(&mut self, policy: OverflowPolicy) {
        self.overflow = policy;
    }

    /// Install the callback for one violation kind, replacing any previous one.
    pub fn set_callback<F>(&mut self, kind: ViolationKind, callback: F)
    where
        F: Fn(&Violation<L, R>) + Send + Sync + 'static,
    {
        self.callbacks.insert(kind, Arc::new(callback));
    }

    /// Remove the callback for one violation kind.
    pub fn clear_callback(&mut self, kind: ViolationKind) {
        self.callbacks.remove(&kind);
    }

    /// Check if a callback is installed for `kind`.
    pub fn has_callback(&self, kind: ViolationKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    // ==================== Queries ====================

    /// Read-only view of the relation.
    pub fn relation(&self) -> &Relation<L, R> {
        &self.relation
    }

    /// Partners of a left entity. `None` means the entity is unknown to this
    /// relation; `Some(vec![])` means known with zero partners.
    pub fn associated_of_left(&self, l: &L) -> Option<Vec<R>> {
        self.relation.partners_of_left(l).map(<[R]>::to_vec)
    }

    /// Partners of a right entity; see [`AssociationSet::associated_of_left`].
    pub fn associated_of_right(&self, r: &R) -> Option<Vec<L>> {
        self.relation.partners_of_right(r).map(<[L]>::to_vec)
    }

    /// Check if a pair is present.
    pub fn contains(&self, l: &L, r: &R) -> bool {
        self.relation.contains(l, r)
    }

    /// Every pair, in no particular order.
    pub fn pairs(&self) -> Vec<(L, R)> {
        self.relation.pairs()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.relation.len()
    }

    /// Check if there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.relation.is_empty()
    }

    // ==================== Mutations ====================

    /// Link `l` and `r`, subject to both overflow rules.
    ///
    /// Returns `Ok(true)` if the pair was inserted and `Ok(false)` if it was
    /// already present or an ignore-policy violation refused it.
    pub fn associate(&mut self, l: L, r: R) -> AssocResult<bool> {
        if self.relation.contains(&l, &r) {
            return Ok(false);
        }

        let forward = if self.forward.can_append(&l, self.relation.left_count(&l))? {
            Verdict::Accept
        } else {
            Verdict::from(self.overflow)
        };
        let backward = if self.backward.can_append(&r, self.relation.right_count(&r))? {
            Verdict::Accept
        } else {
            Verdict::from(self.overflow)
        };

        let committed = {
            let mut batch = Batch::new(format!("associate in {}", self.name));
            if forward == Verdict::Accept && backward == Verdict::Accept {
                let relation = &mut self.relation;
                let (l, r) = (l.clone(), r.clone());
                batch.add_step("insert pair", move || {
                    relation.insert(l, r);
                })?;
                batch.commit()?;
                true
            } else {
                batch.abort()?;
                false
            }
        };

        let violations = [
            (forward, ViolationKind::ForwardOverflow, self.forward.to_string()),
            (backward, ViolationKind::BackwardOverflow, self.backward.to_string()),
        ];
        self.settle(&l, &r, &violations)?;

        if committed {
            debug!(relation = %self.name, left = ?l, right = ?r, "associated");
        }
        Ok(committed)
    }

    /// Unlink `l` and `r`, subject to both underflow rules.
    ///
    /// Under [`UnderflowPolicy::RemoveAssociation`] an entity that would drop
    /// below its minimum is purged from the relation instead of refusing the
    /// removal; its callback still fires. Partners stripped by that purge
    /// which fall below their own minimum are purged as well, each with its
    /// own underflow callback. Returns `Ok(false)` if the pair was
    /// absent or an ignore-policy violation refused the removal.
    pub fn disassociate(&mut self, l: &L, r: &R) -> AssocResult<bool> {
        if !self.relation.contains(l, r) {
            return Ok(false);
        }

        let forward = if self.forward.can_remove(l, self.relation.left_count(l))? {
            Verdict::Accept
        } else {
            Verdict::from(self.underflow)
        };
        let backward = if self.backward.can_remove(r, self.relation.right_count(r))? {
            Verdict::Accept
        } else {
            Verdict::from(self.underflow)
        };

        let proceed = !matches!(forward, Verdict::Ignore | Verdict::Throw)
            && !matches!(backward, Verdict::Ignore | Verdict::Throw);

        let mut cascaded = Vec::new();
        {
            let mut batch = Batch::new(format!("disassociate in {}", self.name));
            if proceed {
                let purge_left = (forward == Verdict::Purge).then(|| l.clone());
                let purge_right = (backward == Verdict::Purge).then(|| r.clone());
                let (settled, collateral) = self.plan_purge(l, r, purge_left, purge_right)?;
                cascaded = collateral;
                let relation = &mut self.relation;
                batch.add_step("remove pair and purge", move || {
                    *relation = settled;
                })?;
                batch.commit()?;
            } else {
                batch.abort()?;
            }
        }

        // A purge that was aborted never happened; report it like an ignore.
        let demote = |v: Verdict| if !proceed && v == Verdict::Purge { Verdict::Accept } else { v };
        let violations = [
            (demote(forward), ViolationKind::ForwardUnderflow, self.forward.to_string()),
            (demote(backward), ViolationKind::BackwardUnderflow, self.backward.to_string()),
        ];
        self.settle(l, r, &violations)?;
        for (kind, left, right) in &cascaded {
            let rule = if kind.is_forward() { self.forward.to_string() } else { self.backward.to_string() };
            self.fire(*kind, left, right, &rule, true);
        }

        if proceed {
            debug!(relation = %self.name, left = ?l, right = ?r, cascaded = cascaded.len(), "disassociated");
            if forward == Verdict::Purge {
                info!(relation = %self.name, entity = ?l, "left entity purged after underflow");
            }
            if backward == Verdict::Purge {
                info!(relation = %self.name, entity = ?r, "right entity purged after underflow");
            }
        }
        Ok(proceed)
    }

    /// Work out the relation after removing `(l, r)` and purging the given
    /// entities.
    ///
    /// Purging an entity strips its other partners as well. Any of those that
    /// drops below its own minimum is purged in turn, until the relation
    /// settles. Returns the settled relation and every cascaded purge as
    /// `(kind, left, right)`, where the pair is the link that was stripped.
    fn plan_purge(
        &self,
        l: &L,
        r: &R,
        purge_left: Option<L>,
        purge_right: Option<R>,
    ) -> AssocResult<(Relation<L, R>, Vec<(ViolationKind, L, R)>)> {
        let mut relation = self.relation.clone();
        relation.remove(l, r);

        let mut seen_left: HashSet<L> = purge_left.iter().cloned().collect();
        let mut seen_right: HashSet<R> = purge_right.iter().cloned().collect();
        let mut lefts: Vec<L> = purge_left.into_iter().collect();
        let mut rights: Vec<R> = purge_right.into_iter().collect();
        let mut cascaded = Vec::new();

        while !lefts.is_empty() || !rights.is_empty() {
            for gone in std::mem::take(&mut lefts) {
                for partner in relation.purge_left(&gone) {
                    let remaining = relation.right_count(&partner);
                    if !seen_right.contains(&partner) && !self.backward.can_remove(&partner, remaining + 1)? {
                        seen_right.insert(partner.clone());
                        cascaded.push((ViolationKind::BackwardUnderflow, gone.clone(), partner.clone()));
                        rights.push(partner);
                    }
                }
            }
            for gone in std::mem::take(&mut rights) {
                for partner in relation.purge_right(&gone) {
                    let remaining = relation.left_count(&partner);
                    if !seen_left.contains(&partner) && !self.forward.can_remove(&partner, remaining + 1)? {
                        seen_left.insert(partner.clone());
                        cascaded.push((ViolationKind::ForwardUnderflow, partner.clone(), gone.clone()));
                        lefts.push(partner);
                    }
                }
            }
        }

        for (kind, left, right) in &cascaded {
            if kind.is_forward() {
                info!(relation = %self.name, entity = ?left, via = ?right, "left entity purged by cascade");
            } else {
                info!(relation = %self.name, entity = ?right, via = ?left, "right entity purged by cascade");
            }
        }
        Ok((relation, cascaded))
    }

    /// Fire callbacks for every violating side, then raise if any side throws.
    fn settle(&self, l: &L, r: &R, sides: &[(Verdict, ViolationKind, String)]) -> AssocResult<()> {
        for (verdict, kind, rule) in sides {
            if *verdict == Verdict::Accept {
                continue;
            }
            debug!(relation = %self.name, %kind, %rule, left = ?l, right = ?r, ?verdict, "cardinality violation");
            self.fire(*kind, l, r, rule, *verdict == Verdict::Purge);
        }

        if let Some((_, kind, rule)) = sides.iter().find(|(v, _, _)| *v == Verdict::Throw) {
            return Err(AssociationError::Violation {
                kind: *kind,
                rule: rule.clone(),
                left: format!("{l:?}"),
                right: format!("{r:?}"),
            });
        }
        Ok(())
    }

    fn fire(&self, kind: ViolationKind, l: &L, r: &R, rule: &str, purged: bool) {
        if let Some(callback) = self.callbacks.get(&kind) {
            callback(&Violation {
                kind,
                left: l.clone(),
                right: r.clone(),
                rule: rule.to_string(),
                purged,
            });
        }
    }

    /// Put back a relation captured earlier with [`AssociationSet::relation`],
    /// discarding every change made since. No rule is checked and no callback
    /// fires.
    pub fn restore_relation(&mut self, relation: Relation<L, R>) {
        self.relation = relation;
    }

    /// Make a left entity known with zero partners.
    pub fn track_left(&mut self, l: L) {
        self.relation.track_left(l);
    }

    /// Make a right entity known with zero partners.
    pub fn track_right(&mut self, r: R) {
        self.relation.track_right(r);
    }

    /// Forget a left entity outright, without cardinality checks. Returns its
    /// former partners.
    pub fn remove_left(&mut self, l: &L) -> Vec<R> {
        self.relation.purge_left(l)
    }

    /// Forget a right entity outright, without cardinality checks.
    pub fn remove_right(&mut self, r: &R) -> Vec<L> {
        self.relation.purge_right(r)
    }

    // ==================== Bulk (de)serialization ====================

    /// Export the relation as sorted integer id pairs.
    pub fn as_id_pairs<FL, FR>(&self, left_id: FL, right_id: FR) -> Vec<(u64, u64)>
    where
        FL: Fn(&L) -> u64,
        FR: Fn(&R) -> u64,
    {
        let mut pairs: Vec<(u64, u64)> = self
            .relation
            .pairs()
            .iter()
            .map(|(l, r)| (left_id(l), right_id(r)))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Replace the relation with the given id pairs.
    ///
    /// Both policies are forced to throw and every callback is suspended while
    /// loading, so previously valid data either loads completely or fails as
    /// corruption. On failure the previous contents are restored. Policies and
    /// callbacks are restored in every case.
    pub fn load_id_pairs<I, FL, FR>(&mut self, pairs: I, left_lookup: FL, right_lookup: FR) -> AssocResult<()>
    where
        I: IntoIterator<Item = (u64, u64)>,
        FL: Fn(u64) -> Option<L>,
        FR: Fn(u64) -> Option<R>,
    {
        let saved_underflow = self.underflow;
        let saved_overflow = self.overflow;
        let saved_callbacks = std::mem::take(&mut self.callbacks);
        self.underflow = UnderflowPolicy::Throw;
        self.overflow = OverflowPolicy::Throw;

        let previous = std::mem::take(&mut self.relation);
        let result = self.load_strict(pairs, left_lookup, right_lookup);
        if result.is_err() {
            self.relation = previous;
        }

        self.underflow = saved_underflow;
        self.overflow = saved_overflow;
        self.callbacks = saved_callbacks;
        result
    }

    fn load_strict<I, FL, FR>(&mut self, pairs: I, left_lookup: FL, right_lookup: FR) -> AssocResult<()>
    where
        I: IntoIterator<Item = (u64, u64)>,
        FL: Fn(u64) -> Option<L>,
        FR: Fn(u64) -> Option<R>,
    {
        let mut loaded = 0usize;
        for (left_id, right_id) in pairs {
            let l = left_lookup(left_id).ok_or(AssociationError::UnknownId { side: "left", id: left_id })?;
            let r = right_lookup(right_id).ok_or(AssociationError::UnknownId { side: "right", id: right_id })?;
            self.associate(l, r)?;
            loaded += 1;
        }
        debug!(relation = %self.name, pairs = loaded, "relation loaded");
        Ok(())
    }
}

impl<L, R> fmt::Debug for AssociationSet<L, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationSet")
            .field("name", &self.name)
            .field("forward", &self.forward)
            .field("backward", &self.backward)
            .field("underflow", &self.underflow)
            .field("overflow", &self.overflow)
            .finish()
    }
}
