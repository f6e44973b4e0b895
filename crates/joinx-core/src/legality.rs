//! # Join Legality
//!
//! Decides whether two assembled relation sets may be joined next and, if so, with
//! which semantics. A plain inner join is always legal on its own; what makes a pair
//! illegal is the registry of special joins (outer, semi and anti joins) and lateral
//! references.
//!
//! ## Special joins
//!
//! Each special join has minimal left and right sides. A candidate pair either
//! *implements* the special join (one input covers the minimal left side, the other
//! the minimal right side), stays entirely inside one of its sides, or splits the
//! right side across the join boundary. The last case is illegal, with a single
//! exception from outer-join associativity: a pair may join into the nullable side of
//! a left join if the pair itself implements a strict left join.
//!
//! A semi join whose right side is available as one input and can be de-duplicated
//! may instead be run as an inner join against the unique-ified input, which frees it
//! to be reordered like any inner join.
//!
//! ## Lateral references
//!
//! A relation that reads columns of another can only sit on the inner side of a
//! nested loop with that relation available outside. Mutual references are never
//! legal; one-way references must be direct and compatible with the matched special
//! join, and accepting the pair must not leave a required outer relation stranded on
//! the nullable side of some outer join.
//!
//! Everything here is a pure function of the registry and the two inputs.

use crate::paths::PathBuilder;
use crate::relation::{JoinRelation, RelHandle, RelStore};
use crate::relids::RelIds;
use crate::special_join::{JoinConstraints, JoinKind, SpecialJoinId, SpecialJoinInfo};
use tracing::trace;

/// Outcome of a legality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Legality {
    /// The pair must not be joined now.
    Illegal,
    Legal(JoinDecision),
}

impl Legality {
    pub fn is_legal(&self) -> bool {
        matches!(self, Legality::Legal(_))
    }

    pub fn decision(&self) -> Option<&JoinDecision> {
        match self {
            Legality::Illegal => None,
            Legality::Legal(d) => Some(d),
        }
    }
}

/// How a legal pair is joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinDecision {
    /// Join semantics; `Inner` for plain joins and for unique-ified semi joins.
    pub kind: JoinKind,
    /// The special join implemented by this pair, if any.
    pub constraint: Option<SpecialJoinId>,
    /// The inputs have to be swapped to match the constraint's left and right sides.
    pub reversed: bool,
    /// The semi join is run as an inner join against a de-duplicated right side.
    pub unique_ified: bool,
}

impl JoinDecision {
    fn inner() -> Self {
        Self {
            kind: JoinKind::Inner,
            constraint: None,
            reversed: false,
            unique_ified: false,
        }
    }
}

/// Read-only view of everything a legality decision depends on.
pub struct LegalityChecker<'a> {
    constraints: &'a JoinConstraints,
    paths: &'a dyn PathBuilder,
    store: &'a RelStore,
    initial_rels: &'a [RelHandle],
}

impl<'a> LegalityChecker<'a> {
    pub fn new(
        constraints: &'a JoinConstraints,
        paths: &'a dyn PathBuilder,
        store: &'a RelStore,
        initial_rels: &'a [RelHandle],
    ) -> Self {
        Self {
            constraints,
            paths,
            store,
            initial_rels,
        }
    }

    /// Decide whether `rel1` and `rel2` may be joined, and how.
    pub fn check_legality(&self, rel1: &JoinRelation, rel2: &JoinRelation) -> Legality {
        let joinrelids = rel1.relids.union(&rel2.relids);

        let mut matched: Option<(SpecialJoinId, &SpecialJoinInfo)> = None;
        let mut reversed = false;
        let mut unique_ified = false;
        let mut must_be_leftjoin = false;

        for (id, sjinfo) in self.constraints.special_joins.iter().enumerate() {
            // Not relevant unless the join overlaps the right side.
            if !sjinfo.min_righthand.overlaps(&joinrelids) {
                continue;
            }
            // Still assembling the right side.
            if joinrelids.is_subset_of(&sjinfo.min_righthand) {
                continue;
            }
            // Already implemented within one input.
            if sjinfo.is_contained_in(&rel1.relids) || sjinfo.is_contained_in(&rel2.relids) {
                continue;
            }
            // The right side of a semi join was already unique-ified inside an input.
            if sjinfo.kind == JoinKind::Semi
                && (is_strict_subset(&sjinfo.syn_righthand, &rel1.relids)
                    || is_strict_subset(&sjinfo.syn_righthand, &rel2.relids))
            {
                continue;
            }

            if sjinfo.min_lefthand.is_subset_of(&rel1.relids)
                && sjinfo.min_righthand.is_subset_of(&rel2.relids)
            {
                if matched.is_some() {
                    return self.illegal(rel1, rel2, "matches more than one special join");
                }
                matched = Some((id, sjinfo));
                reversed = false;
            } else if sjinfo.min_lefthand.is_subset_of(&rel2.relids)
                && sjinfo.min_righthand.is_subset_of(&rel1.relids)
            {
                if matched.is_some() {
                    return self.illegal(rel1, rel2, "matches more than one special join");
                }
                matched = Some((id, sjinfo));
                reversed = true;
            } else if sjinfo.kind == JoinKind::Semi
                && sjinfo.syn_righthand == rel2.relids
                && self.paths.unique_path(rel2, sjinfo).is_some()
            {
                if matched.is_some() {
                    return self.illegal(rel1, rel2, "matches more than one special join");
                }
                matched = Some((id, sjinfo));
                reversed = false;
                unique_ified = true;
            } else if sjinfo.kind == JoinKind::Semi
                && sjinfo.syn_righthand == rel1.relids
                && self.paths.unique_path(rel1, sjinfo).is_some()
            {
                if matched.is_some() {
                    return self.illegal(rel1, rel2, "matches more than one special join");
                }
                matched = Some((id, sjinfo));
                reversed = true;
                unique_ified = true;
            } else {
                // Both inputs overlap the right side: an earlier commutation was
                // accepted, so this one is too.
                if rel1.relids.overlaps(&sjinfo.min_righthand)
                    && rel2.relids.overlaps(&sjinfo.min_righthand)
                {
                    continue;
                }
                // Joining into the nullable side of a left join is only possible via
                // associativity with a strict left join.
                if sjinfo.kind != JoinKind::Left || joinrelids.overlaps(&sjinfo.min_lefthand) {
                    return self.illegal(rel1, rel2, "splits the right side of a special join");
                }
                must_be_leftjoin = true;
            }
        }

        if must_be_leftjoin
            && !matches!(matched, Some((_, sj)) if sj.kind == JoinKind::Left && sj.lhs_strict)
        {
            return self.illegal(rel1, rel2, "commutes into a left join without a strict left join");
        }

        if self.constraints.has_lateral {
            let lateral_fwd = rel1.relids.overlaps(&rel2.lateral_relids);
            let lateral_rev = rel2.relids.overlaps(&rel1.lateral_relids);
            let full = matches!(matched, Some((_, sj)) if sj.kind == JoinKind::Full);

            if lateral_fwd && lateral_rev {
                return self.illegal(rel1, rel2, "mutual lateral references");
            } else if lateral_fwd {
                // nested loop with rel1 outside
                if matched.is_some() && (reversed || unique_ified || full) {
                    return self.illegal(rel1, rel2, "lateral reference needs rel2 inner");
                }
                if !rel1.relids.overlaps(&rel2.direct_lateral_relids) {
                    return self.illegal(rel1, rel2, "only indirect lateral references");
                }
                if self.have_dangerous_phv(&rel1.relids, &rel2.lateral_relids) {
                    return self.illegal(rel1, rel2, "placeholder not computable");
                }
            } else if lateral_rev {
                if matched.is_some() && (!reversed || unique_ified || full) {
                    return self.illegal(rel1, rel2, "lateral reference needs rel1 inner");
                }
                if !rel2.relids.overlaps(&rel1.direct_lateral_relids) {
                    return self.illegal(rel1, rel2, "only indirect lateral references");
                }
                if self.have_dangerous_phv(&rel2.relids, &rel1.lateral_relids) {
                    return self.illegal(rel1, rel2, "placeholder not computable");
                }
            }

            let join_lateral_rels = min_join_parameterization(&joinrelids, rel1, rel2);
            if !join_lateral_rels.is_empty()
                && self.join_plus_rhs(&joinrelids).overlaps(&join_lateral_rels)
            {
                return self.illegal(rel1, rel2, "lateral reference to a nullable relation");
            }
        }

        let decision = match matched {
            None => JoinDecision::inner(),
            Some((id, sjinfo)) => JoinDecision {
                kind: if unique_ified { JoinKind::Inner } else { sjinfo.kind },
                constraint: Some(id),
                reversed,
                unique_ified,
            },
        };
        Legality::Legal(decision)
    }

    fn illegal(&self, rel1: &JoinRelation, rel2: &JoinRelation, reason: &str) -> Legality {
        trace!("illegal join {} x {}: {}", rel1.relids, rel2.relids, reason);
        Legality::Illegal
    }

    /// `joinrelids` plus, transitively, the minimal right side of every non-full
    /// special join whose left side it overlaps.
    fn join_plus_rhs(&self, joinrelids: &RelIds) -> RelIds {
        let mut join_plus_rhs = joinrelids.clone();
        loop {
            let mut more = false;
            for sjinfo in &self.constraints.special_joins {
                match sjinfo.kind {
                    JoinKind::Full => continue,
                    JoinKind::Inner | JoinKind::Left | JoinKind::Semi | JoinKind::Anti => {}
                }
                if sjinfo.min_lefthand.overlaps(&join_plus_rhs)
                    && !sjinfo.min_righthand.is_subset_of(&join_plus_rhs)
                {
                    join_plus_rhs = join_plus_rhs.union(&sjinfo.min_righthand);
                    more = true;
                }
            }
            if !more {
                return join_plus_rhs;
            }
        }
    }

    /// Would a nested loop with `outer_relids` outside have to compute a placeholder
    /// below the join that needs relations it does not have yet?
    pub fn have_dangerous_phv(&self, outer_relids: &RelIds, inner_params: &RelIds) -> bool {
        self.constraints.placeholders.iter().any(|phinfo| {
            phinfo.eval_at.is_subset_of(inner_params)
                && phinfo.eval_at.overlaps(outer_relids)
                && !phinfo.eval_at.is_subset_of(outer_relids)
        })
    }

    /// Could `rel` take part in a join-order restriction with some other relation?
    /// May answer true spuriously.
    pub fn has_join_restriction(&self, rel: &JoinRelation) -> bool {
        if !rel.lateral_relids.is_empty() || !rel.lateral_referencers.is_empty() {
            return true;
        }

        if self
            .constraints
            .placeholders
            .iter()
            .any(|ph| is_strict_subset(&rel.relids, &ph.eval_at))
        {
            return true;
        }

        self.constraints.special_joins.iter().any(|sjinfo| match sjinfo.kind {
            // ordering of full joins is fixed elsewhere
            JoinKind::Full => false,
            JoinKind::Inner | JoinKind::Left | JoinKind::Semi | JoinKind::Anti => {
                !sjinfo.is_contained_in(&rel.relids)
                    && (sjinfo.min_lefthand.overlaps(&rel.relids)
                        || sjinfo.min_righthand.overlaps(&rel.relids))
            }
        })
    }

    /// Should `rel1` and `rel2` be joined even without a join clause between them,
    /// because some ordering constraint forces them together?
    pub fn have_join_order_restriction(&self, rel1: &JoinRelation, rel2: &JoinRelation) -> bool {
        if rel1.relids.overlaps(&rel2.direct_lateral_relids)
            || rel2.relids.overlaps(&rel1.direct_lateral_relids)
        {
            return true;
        }

        if self.constraints.placeholders.iter().any(|ph| {
            rel1.relids.is_subset_of(&ph.eval_at) && rel2.relids.is_subset_of(&ph.eval_at)
        }) {
            return true;
        }

        let restricted = self.constraints.special_joins.iter().any(|sjinfo| {
            if sjinfo.kind == JoinKind::Full {
                return false;
            }
            if sjinfo.is_contained_in(&rel1.relids) || sjinfo.is_contained_in(&rel2.relids) {
                return false;
            }
            let (l, r) = (&sjinfo.min_lefthand, &sjinfo.min_righthand);
            // one input on each side, or both inputs on the same side
            (l.overlaps(&rel1.relids) && r.overlaps(&rel2.relids))
                || (l.overlaps(&rel2.relids) && r.overlaps(&rel1.relids))
                || (r.overlaps(&rel1.relids) && r.overlaps(&rel2.relids))
                || (l.overlaps(&rel1.relids) && l.overlaps(&rel2.relids))
        });

        // A clauseless join can wait if either side still has a legal clause join to
        // make first.
        restricted && !self.has_legal_joinclause(rel1) && !self.has_legal_joinclause(rel2)
    }

    /// Does `rel` have a join clause to some initial relation it may legally join now?
    fn has_legal_joinclause(&self, rel: &JoinRelation) -> bool {
        self.initial_rels.iter().any(|&handle| {
            let other = self.store.get(handle);
            !rel.relids.overlaps(&other.relids)
                && self
                    .constraints
                    .have_relevant_joinclause(&rel.relids, &other.relids)
                && self.check_legality(rel, other).is_legal()
        })
    }
}

/// Relations the join of `rel1` and `rel2` still needs laterally from outside.
pub fn min_join_parameterization(
    joinrelids: &RelIds,
    rel1: &JoinRelation,
    rel2: &JoinRelation,
) -> RelIds {
    rel1.lateral_relids
        .union(&rel2.lateral_relids)
        .difference(joinrelids)
}

fn is_strict_subset(a: &RelIds, b: &RelIds) -> bool {
    a.is_subset_of(b) && a != b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::Cost;
    use crate::paths::JoinPathRequest;
    use crate::relation::Path;
    use crate::restrict::RestrictInfo;

    struct NoUnique;

    impl PathBuilder for NoUnique {
        fn estimate_rows(&self, _: &JoinRelation, _: &JoinRelation, _: &SpecialJoinInfo, _: &[RestrictInfo]) -> f64 {
            1.0
        }
        fn join_paths(&self, _: &JoinRelation, _: &JoinRelation, _: &JoinRelation, _: &JoinPathRequest<'_>) -> Vec<Path> {
            Vec::new()
        }
        fn unique_path(&self, _: &JoinRelation, _: &SpecialJoinInfo) -> Option<Path> {
            None
        }
        fn append_paths(&self, _: &JoinRelation, _: &[&JoinRelation]) -> Vec<Path> {
            Vec::new()
        }
    }

    fn set(ids: &[usize]) -> RelIds {
        ids.iter().copied().collect()
    }

    fn rel(ids: &[usize]) -> JoinRelation {
        let mut r = JoinRelation::new(crate::relation::RelKind::Join, set(ids), "r");
        r.add_path(Path::scan(Cost::new(1.0), 1.0));
        r
    }

    #[test]
    fn test_plain_inner_without_constraints() {
        let constraints = JoinConstraints::new();
        let store = RelStore::new();
        let checker = LegalityChecker::new(&constraints, &NoUnique, &store, &[]);
        let legality = checker.check_legality(&rel(&[1]), &rel(&[2]));
        assert_eq!(legality, Legality::Legal(JoinDecision::inner()));
    }

    #[test]
    fn test_left_join_orientation() {
        let mut constraints = JoinConstraints::new();
        let id = constraints.add_special_join(SpecialJoinInfo::new(JoinKind::Left, set(&[1]), set(&[2])));
        let store = RelStore::new();
        let checker = LegalityChecker::new(&constraints, &NoUnique, &store, &[]);

        let fwd = checker.check_legality(&rel(&[1]), &rel(&[2]));
        let rev = checker.check_legality(&rel(&[2]), &rel(&[1]));
        assert_eq!(fwd.decision().map(|d| (d.kind, d.constraint, d.reversed)), Some((JoinKind::Left, Some(id), false)));
        assert_eq!(rev.decision().map(|d| (d.kind, d.constraint, d.reversed)), Some((JoinKind::Left, Some(id), true)));
    }

    #[test]
    fn test_has_join_restriction_ignores_full_joins() {
        let mut constraints = JoinConstraints::new();
        constraints.add_special_join(SpecialJoinInfo::new(JoinKind::Full, set(&[1]), set(&[2])));
        let store = RelStore::new();
        let checker = LegalityChecker::new(&constraints, &NoUnique, &store, &[]);
        assert!(!checker.has_join_restriction(&rel(&[1])));

        let mut constraints = JoinConstraints::new();
        constraints.add_special_join(SpecialJoinInfo::new(JoinKind::Anti, set(&[1]), set(&[2])));
        let checker = LegalityChecker::new(&constraints, &NoUnique, &store, &[]);
        assert!(checker.has_join_restriction(&rel(&[2])));
        assert!(!checker.has_join_restriction(&rel(&[1, 2])));
    }

    #[test]
    fn test_dangerous_placeholder() {
        let mut constraints = JoinConstraints::new();
        constraints.add_placeholder(set(&[1, 2]));
        let store = RelStore::new();
        let checker = LegalityChecker::new(&constraints, &NoUnique, &store, &[]);
        assert!(checker.have_dangerous_phv(&set(&[1]), &set(&[1, 2])));
        assert!(!checker.have_dangerous_phv(&set(&[1, 2]), &set(&[1, 2])));
        assert!(!checker.have_dangerous_phv(&set(&[3]), &set(&[1, 2])));
    }
}
