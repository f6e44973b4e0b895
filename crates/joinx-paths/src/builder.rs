//! # Default Path Builder
//!
//! Proposes nested-loop, hash and merge join paths for every join the search asks
//! about, priced with a [`JoinCostModel`]. Which strategies apply depends on the join
//! kind and orientation:
//!
//! | Request                          | Strategies                        |
//! |----------------------------------|-----------------------------------|
//! | Inner, Semi, Left, Anti          | nested loop, hash, merge          |
//! | Left or Full with swapped inputs | hash, merge                       |
//! | Full                             | hash, merge                       |
//! | Unique-ified inner or outer      | hash against the de-duplicated side |
//!
//! Hash and merge joins need at least one clause flagged as an equality; without one
//! only the nested loop remains, which also stands in for clause-free full joins.
//!
//! With a leading directive, joins that go against it are priced at the disable
//! cost on top of their regular cost, and hinted pairs are flagged on their paths.

use crate::cost::JoinCostModel;
use crate::leading::LeadingHints;
use joinx_core::cost::Cost;
use joinx_core::hint::HintOracle;
use joinx_core::paths::{JoinPathRequest, PathBuilder, UniqueSide};
use joinx_core::relation::{JoinRelation, Path, PathKind};
use joinx_core::restrict::RestrictInfo;
use joinx_core::special_join::{JoinKind, SpecialJoinInfo};
use std::sync::Arc;

pub struct DefaultPathBuilder {
    pub model: JoinCostModel,
    leading: Arc<LeadingHints>,
    disable_cost: f64,
}

impl DefaultPathBuilder {
    pub fn new(model: JoinCostModel) -> Self {
        Self {
            model,
            leading: Arc::new(LeadingHints::none()),
            disable_cost: 1.0e10,
        }
    }

    /// Price joins against `leading` with `disable_cost`.
    pub fn with_leading(mut self, leading: Arc<LeadingHints>, disable_cost: f64) -> Self {
        self.leading = leading;
        self.disable_cost = disable_cost;
        self
    }

    fn strategies(request: &JoinPathRequest<'_>, has_equi: bool) -> Vec<PathKind> {
        let mut kinds = match request.unique {
            UniqueSide::Inner => return vec![PathKind::UniqueInner],
            UniqueSide::Outer => return vec![PathKind::UniqueOuter],
            UniqueSide::None => match request.kind {
                JoinKind::Full => vec![],
                JoinKind::Left if request.swapped => vec![],
                JoinKind::Inner | JoinKind::Left | JoinKind::Semi | JoinKind::Anti => {
                    vec![PathKind::NestLoop]
                }
            },
        };
        if has_equi {
            kinds.push(PathKind::HashJoin);
            kinds.push(PathKind::MergeJoin);
        } else if kinds.is_empty() && request.kind == JoinKind::Full && !request.swapped {
            kinds.push(PathKind::NestLoop);
        }
        kinds
    }
}

impl Default for DefaultPathBuilder {
    fn default() -> Self {
        Self::new(JoinCostModel::default())
    }
}

/// A non-constant equality join key.
fn is_equi_clause(rinfo: &RestrictInfo) -> bool {
    rinfo.is_equality && rinfo.constant.is_none()
}

fn cheapest_total(rel: &JoinRelation) -> Cost {
    rel.cheapest().map(|p| p.total_cost).unwrap_or_else(Cost::infinite)
}

fn carries_hint(rel: &JoinRelation) -> bool {
    rel.cheapest().is_some_and(|p| p.carries_hint())
}

impl PathBuilder for DefaultPathBuilder {
    fn estimate_rows(
        &self,
        rel1: &JoinRelation,
        rel2: &JoinRelation,
        sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
    ) -> f64 {
        let clauses = restrictions.iter().filter(|r| r.constant.is_none()).count();
        let selectivity = self.model.clause_selectivity.powi(clauses as i32);
        let matched = rel1.rows * rel2.rows * selectivity;

        // rel1 is the constraint's left side
        let rows = match sjinfo.kind {
            JoinKind::Inner => matched,
            JoinKind::Left => matched.max(rel1.rows),
            JoinKind::Full => matched.max(rel1.rows + rel2.rows),
            JoinKind::Semi => matched.min(rel1.rows),
            JoinKind::Anti => (rel1.rows - matched.min(rel1.rows)).max(rel1.rows * selectivity),
        };
        rows.max(1.0)
    }

    fn join_paths(
        &self,
        joinrel: &JoinRelation,
        outer: &JoinRelation,
        inner: &JoinRelation,
        request: &JoinPathRequest<'_>,
    ) -> Vec<Path> {
        let has_equi = request.restrictions.iter().any(is_equi_clause);
        let inputs = cheapest_total(outer).plus(cheapest_total(inner));
        let is_hinted = self.leading.is_hinted(&outer.relids, Some(&inner.relids), false);
        let below = carries_hint(outer) || carries_hint(inner);
        let penalty = if !is_hinted && self.leading.conflicts(&outer.relids, &inner.relids) {
            self.disable_cost
        } else {
            0.0
        };

        Self::strategies(request, has_equi)
            .into_iter()
            .map(|kind| {
                let (outer_rows, inner_rows, extra) = match kind {
                    PathKind::UniqueInner => (
                        outer.rows,
                        self.model.unique_rows(inner.rows),
                        self.model.unique_cost(inner.rows),
                    ),
                    PathKind::UniqueOuter => (
                        self.model.unique_rows(outer.rows),
                        inner.rows,
                        self.model.unique_cost(outer.rows),
                    ),
                    _ => (outer.rows, inner.rows, 0.0),
                };
                let local = self.model.join_cost(kind, outer_rows, inner_rows, joinrel.rows) + extra;
                let total = inputs.plus(Cost::new(local + penalty));
                Path::join(
                    kind,
                    request.kind,
                    total,
                    joinrel.rows,
                    outer.relids.clone(),
                    inner.relids.clone(),
                )
                .hinted(is_hinted, below)
            })
            .collect()
    }

    fn unique_path(&self, rel: &JoinRelation, _sjinfo: &SpecialJoinInfo) -> Option<Path> {
        if rel.is_dummy {
            return None;
        }
        let input = rel.cheapest()?;
        let rows = self.model.unique_rows(rel.rows);
        let mut path = Path::scan(
            input.total_cost.plus(Cost::new(self.model.unique_cost(rel.rows))),
            rows,
        );
        path.kind = PathKind::Unique;
        Some(path)
    }

    fn append_paths(&self, _joinrel: &JoinRelation, children: &[&JoinRelation]) -> Vec<Path> {
        let children_total = children
            .iter()
            .fold(Cost::zero(), |acc, child| acc.plus(cheapest_total(child)));
        let rows: f64 = children.iter().map(|c| c.rows).sum();
        let mut path = Path::scan(children_total.plus(Cost::new(self.model.append_cost(rows))), rows);
        path.kind = PathKind::Append;
        path.has_hinted_descendant = children.iter().any(|c| carries_hint(c));
        vec![path]
    }

    /// Partition-aligned inputs only split usefully on an equality join clause.
    fn partitionwise_eligible(
        &self,
        _rel1: &JoinRelation,
        _rel2: &JoinRelation,
        _sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
    ) -> bool {
        restrictions.iter().any(is_equi_clause)
    }
}
