//! # Special-Join Registry
//!
//! Everything the join tree of the query says about ordering, beyond plain inner-join
//! predicates, is collected here before the search runs:
//!
//! - **Special joins** (`SpecialJoinInfo`): one entry per outer, semi or anti join,
//!   describing the smallest relation sets that must be assembled on each side before
//!   the join's semantics are preserved.
//! - **Placeholders** (`PlaceholderInfo`): expressions that can only be evaluated once
//!   a particular relation set is complete.
//! - **Join clauses** (`RestrictInfo`): the predicates that link relations together;
//!   the search driver prefers pairs connected by one of these.
//!
//! The registry is read-only for the whole run.

use crate::relids::RelIds;
use crate::restrict::RestrictInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Join semantics a pair of relations can be combined with.
///
/// Right joins never appear: the join tree is normalized so that the preserved side of
/// a one-sided outer join is always the left-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    /// Only matching rows from both sides.
    Inner,
    /// All left rows; right side null-extended where no match exists.
    Left,
    /// All rows from both sides, null-extended on whichever side lacks a match.
    Full,
    /// Left rows that have at least one match on the right.
    Semi,
    /// Left rows that have no match on the right.
    Anti,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Full => "FULL",
            JoinKind::Semi => "SEMI",
            JoinKind::Anti => "ANTI",
        };
        f.write_str(name)
    }
}

/// Index of a special join within the registry.
pub type SpecialJoinId = usize;

/// An outer, semi or anti join constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialJoinInfo {
    /// Base relations that must be on the left before this join can be performed.
    pub min_lefthand: RelIds,
    /// Base relations that must be on the right before this join can be performed.
    pub min_righthand: RelIds,
    /// Base relations syntactically below the join on the left.
    pub syn_lefthand: RelIds,
    /// Base relations syntactically below the join on the right.
    pub syn_righthand: RelIds,
    pub kind: JoinKind,
    /// For left joins: the ON clause is strict (null-rejecting) for the left side.
    #[serde(default)]
    pub lhs_strict: bool,
}

impl SpecialJoinInfo {
    /// A constraint whose minimal and syntactic sides coincide.
    pub fn new(kind: JoinKind, lefthand: RelIds, righthand: RelIds) -> Self {
        Self {
            min_lefthand: lefthand.clone(),
            min_righthand: righthand.clone(),
            syn_lefthand: lefthand,
            syn_righthand: righthand,
            kind,
            lhs_strict: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.lhs_strict = true;
        self
    }

    /// Stand-in constraint for a plain inner join between two inputs, as used when
    /// translating join structures onto partition children.
    pub fn inner(lefthand: RelIds, righthand: RelIds) -> Self {
        Self::new(JoinKind::Inner, lefthand, righthand)
    }

    /// Both minimal sides are already inside `relids`: the join is done there.
    pub fn is_contained_in(&self, relids: &RelIds) -> bool {
        self.min_lefthand.is_subset_of(relids) && self.min_righthand.is_subset_of(relids)
    }
}

/// An expression that must be evaluated no earlier than `eval_at` is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderInfo {
    pub eval_at: RelIds,
}

/// Ordering constraints for one planning run.
#[derive(Debug, Clone, Default)]
pub struct JoinConstraints {
    pub special_joins: Vec<SpecialJoinInfo>,
    pub placeholders: Vec<PlaceholderInfo>,
    pub join_clauses: Vec<RestrictInfo>,
    /// True if any relation in the query carries lateral references.
    pub has_lateral: bool,
}

impl JoinConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_special_join(&mut self, sjinfo: SpecialJoinInfo) -> SpecialJoinId {
        self.special_joins.push(sjinfo);
        self.special_joins.len() - 1
    }

    pub fn add_placeholder(&mut self, eval_at: RelIds) {
        self.placeholders.push(PlaceholderInfo { eval_at });
    }

    pub fn add_join_clause(&mut self, clause: RestrictInfo) {
        self.join_clauses.push(clause);
    }

    pub fn special_join(&self, id: SpecialJoinId) -> &SpecialJoinInfo {
        &self.special_joins[id]
    }

    /// Clauses that become evaluable exactly at the join of `rel1` and `rel2`.
    pub fn restrictions_for(&self, rel1: &RelIds, rel2: &RelIds) -> Vec<RestrictInfo> {
        let joinrelids = rel1.union(rel2);
        self.join_clauses
            .iter()
            .filter(|c| {
                c.required_relids.is_subset_of(&joinrelids)
                    && !c.required_relids.is_subset_of(rel1)
                    && !c.required_relids.is_subset_of(rel2)
            })
            .cloned()
            .collect()
    }

    /// Does `relids` participate in a join clause that still needs other relations?
    pub fn has_join_clauses(&self, relids: &RelIds) -> bool {
        self.join_clauses.iter().any(|c| {
            c.required_relids.overlaps(relids) && !c.required_relids.is_subset_of(relids)
        })
    }

    /// Is there a join clause linking `rel1` to `rel2`?
    pub fn have_relevant_joinclause(&self, rel1: &RelIds, rel2: &RelIds) -> bool {
        self.join_clauses.iter().any(|c| {
            c.required_relids.overlaps(rel1)
                && !c.required_relids.is_subset_of(rel1)
                && c.required_relids.overlaps(rel2)
        })
    }
}
