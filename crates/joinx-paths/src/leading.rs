//! # Leading-Order Hints
//!
//! A leading directive fixes the join order of some relations: `((a b) (c d))` asks for
//! `a` joined to `b`, `c` joined to `d`, and the two results joined, each pair with the
//! first member as the outer side.
//!
//! [`LeadingHints`] answers the search's [`HintOracle`] questions from the directive's
//! pairs, and tells the path builder which joins conflict with it so they can be
//! priced as disabled.

use joinx_core::hint::HintOracle;
use joinx_core::relids::RelIds;

/// A join-order directive over relation ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadingOrder {
    Rel(usize),
    Join(Box<LeadingOrder>, Box<LeadingOrder>),
}

impl LeadingOrder {
    pub fn join(outer: LeadingOrder, inner: LeadingOrder) -> Self {
        LeadingOrder::Join(Box::new(outer), Box::new(inner))
    }

    pub fn relids(&self) -> RelIds {
        match self {
            LeadingOrder::Rel(id) => RelIds::singleton(*id),
            LeadingOrder::Join(outer, inner) => outer.relids().union(&inner.relids()),
        }
    }

    /// Every (outer, inner) pair the directive names, innermost first.
    fn collect_pairs(&self, out: &mut Vec<(RelIds, RelIds)>) {
        if let LeadingOrder::Join(outer, inner) = self {
            outer.collect_pairs(out);
            inner.collect_pairs(out);
            out.push((outer.relids(), inner.relids()));
        }
    }
}

/// Hint oracle for at most one leading directive.
#[derive(Debug, Clone, Default)]
pub struct LeadingHints {
    pairs: Vec<(RelIds, RelIds)>,
    /// Every relation the directive mentions.
    covered: RelIds,
}

impl LeadingHints {
    /// No directive: nothing is hinted, nothing conflicts.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(order: &LeadingOrder) -> Self {
        let mut pairs = Vec::new();
        order.collect_pairs(&mut pairs);
        Self {
            pairs,
            covered: order.relids(),
        }
    }

    pub fn pairs(&self) -> &[(RelIds, RelIds)] {
        &self.pairs
    }

    /// Would joining `outer` to `inner` in this orientation go against the directive?
    ///
    /// Joins entirely outside the directive's relations never conflict. Inside them,
    /// only the named pairs are allowed; above them, the directive's relations must
    /// already be complete within one input.
    pub fn conflicts(&self, outer: &RelIds, inner: &RelIds) -> bool {
        if self.pairs.is_empty() {
            return false;
        }
        let joined = outer.union(inner);
        if !joined.overlaps(&self.covered) {
            return false;
        }
        if joined.is_subset_of(&self.covered) {
            return !self.is_hinted(outer, Some(inner), false);
        }
        let completes = |side: &RelIds| self.covered.is_subset_of(side);
        let untouched = |side: &RelIds| !side.overlaps(&self.covered);
        !((completes(outer) && untouched(inner)) || (completes(inner) && untouched(outer)))
    }
}

impl HintOracle for LeadingHints {
    fn has_leading_hint(&self) -> bool {
        !self.pairs.is_empty()
    }

    fn is_hinted(&self, outer: &RelIds, inner: Option<&RelIds>, try_swapped: bool) -> bool {
        self.pairs.iter().any(|(o, i)| match inner {
            None => o == outer || i == outer,
            Some(inner) => (o == outer && i == inner) || (try_swapped && o == inner && i == outer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[usize]) -> RelIds {
        ids.iter().copied().collect()
    }

    fn bushy() -> LeadingHints {
        // ((1 2) (3 4))
        LeadingHints::new(&LeadingOrder::join(
            LeadingOrder::join(LeadingOrder::Rel(1), LeadingOrder::Rel(2)),
            LeadingOrder::join(LeadingOrder::Rel(3), LeadingOrder::Rel(4)),
        ))
    }

    #[test]
    fn test_pairs_innermost_first() {
        let hints = bushy();
        assert_eq!(
            hints.pairs(),
            &[
                (set(&[1]), set(&[2])),
                (set(&[3]), set(&[4])),
                (set(&[1, 2]), set(&[3, 4])),
            ]
        );
        assert!(hints.has_leading_hint());
        assert!(!LeadingHints::none().has_leading_hint());
    }

    #[test]
    fn test_is_hinted_orientation() {
        let hints = bushy();
        assert!(hints.is_hinted(&set(&[1]), Some(&set(&[2])), false));
        assert!(!hints.is_hinted(&set(&[2]), Some(&set(&[1])), false));
        assert!(hints.is_hinted(&set(&[2]), Some(&set(&[1])), true));
        assert!(hints.is_hinted(&set(&[3, 4]), None, true));
        assert!(!hints.is_hinted(&set(&[1, 3]), None, true));
    }

    #[test]
    fn test_conflicts() {
        let hints = bushy();
        assert!(!hints.conflicts(&set(&[1]), &set(&[2])));
        assert!(hints.conflicts(&set(&[2]), &set(&[1])));
        assert!(hints.conflicts(&set(&[1, 2]), &set(&[3])));
        assert!(!hints.conflicts(&set(&[1, 2]), &set(&[3, 4])));
        // relations outside the directive join freely
        assert!(!hints.conflicts(&set(&[5]), &set(&[6])));
        // above the directive: it must be complete on one side
        assert!(!hints.conflicts(&set(&[1, 2, 3, 4]), &set(&[5])));
        assert!(hints.conflicts(&set(&[1, 2]), &set(&[5])));
    }
}
