//! # Restriction Clauses
//!
//! A `RestrictInfo` is a qualification clause as far as join enumeration cares: the set
//! of relations it needs before it can be evaluated, whether it was pushed down from
//! above an outer join, and whether it folded to a constant. Clause bodies are opaque
//! to the core; `label` only exists for diagnostics and for the translator to rewrite.

use crate::relids::RelIds;
use serde::{Deserialize, Serialize};

/// A restriction or join clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestrictInfo {
    /// Human-readable clause text, e.g. `a.x = b.x`.
    pub label: String,
    /// Relations that must all be present before the clause can be evaluated.
    pub required_relids: RelIds,
    /// True if the clause was written above (outside) the outer join it is checked at.
    #[serde(default)]
    pub is_pushed_down: bool,
    /// An equality between an expression of each side, usable as a hash or merge key.
    #[serde(default)]
    pub is_equality: bool,
    /// `Some(Some(b))` for a constant boolean, `Some(None)` for a constant NULL,
    /// `None` for anything that is not a constant.
    #[serde(default)]
    pub constant: Option<Option<bool>>,
}

impl RestrictInfo {
    pub fn new(label: impl Into<String>, required_relids: RelIds) -> Self {
        Self {
            label: label.into(),
            required_relids,
            is_pushed_down: false,
            is_equality: false,
            constant: None,
        }
    }

    /// Same clause, marked as an equality join key.
    pub fn equality(mut self) -> Self {
        self.is_equality = true;
        self
    }

    /// A clause that folded to constant FALSE.
    pub fn constant_false(required_relids: RelIds) -> Self {
        Self {
            label: "false".to_string(),
            required_relids,
            is_pushed_down: false,
            is_equality: false,
            constant: Some(Some(false)),
        }
    }

    pub fn pushed_down(mut self) -> Self {
        self.is_pushed_down = true;
        self
    }

    /// Whether the clause counts as pushed down when evaluated at `joinrelids`: either
    /// it was flagged as such, or it needs relations the join does not have.
    pub fn is_pushed_down_at(&self, joinrelids: &RelIds) -> bool {
        self.is_pushed_down || !self.required_relids.is_subset_of(joinrelids)
    }

    fn is_constant_false(&self) -> bool {
        // constant NULL is as good as constant FALSE here
        matches!(self.constant, Some(None) | Some(Some(false)))
    }
}

/// Is the restriction list provably FALSE?
///
/// Other clauses may still be present next to the constant, so every member is
/// checked. With `only_pushed_down`, only clauses pushed down relative to `joinrelids`
/// take part, which is what outer joins need: a false ON clause still null-extends.
pub fn restriction_is_constant_false(
    restrictions: &[RestrictInfo],
    joinrelids: &RelIds,
    only_pushed_down: bool,
) -> bool {
    restrictions.iter().any(|rinfo| {
        if only_pushed_down && !rinfo.is_pushed_down_at(joinrelids) {
            return false;
        }
        rinfo.is_constant_false()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[usize]) -> RelIds {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_constant_false_detection() {
        let join = set(&[1, 2]);
        let clauses = vec![
            RestrictInfo::new("a.x = b.x", join.clone()),
            RestrictInfo::constant_false(join.clone()),
        ];
        assert!(restriction_is_constant_false(&clauses, &join, false));
        // The false clause is an ON clause, so it does not count as pushed down.
        assert!(!restriction_is_constant_false(&clauses, &join, true));

        let null_clause = RestrictInfo {
            constant: Some(None),
            ..RestrictInfo::new("null", join.clone())
        }
        .pushed_down();
        assert!(restriction_is_constant_false(&[null_clause], &join, true));
    }

    #[test]
    fn test_true_constant_is_not_false() {
        let join = set(&[1, 2]);
        let clause = RestrictInfo {
            constant: Some(Some(true)),
            ..RestrictInfo::new("true", join.clone())
        };
        assert!(!restriction_is_constant_false(&[clause], &join, false));
    }
}
