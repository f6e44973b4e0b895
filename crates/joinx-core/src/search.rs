//! # Level-by-Level Join Search
//!
//! Dynamic-programming enumeration of join orders. Level `k` holds every relation set
//! of exactly `k` base relations discovered so far; level 1 is seeded by the caller
//! and each later level is built from the ones below it.
//!
//! ## How a level is built
//!
//! 1. **Direct extension**: every relation one level down is paired with initial
//!    relations. Relations linked to others by a join clause or an ordering
//!    restriction only pair where such a link (or a hint directive) exists; relations
//!    without any link are Cartesian-joined with every initial relation they lack.
//! 2. **Bushy extension**: relations of `k` members are paired with relations of
//!    `level - k` members, for `2 <= k <= level / 2`, but only where a clause, an
//!    ordering restriction or a hint directive calls for it. Unconstrained bushy
//!    products are not explored.
//! 3. **Starvation fallback**: if neither produced anything, every relation one level
//!    down is Cartesian-joined with every initial relation. An empty level after that
//!    is only legitimate when special joins or lateral references are present.
//!
//! Every candidate pair goes through [`JoinSearch::make_join_rel`]: the legality
//! check, build-or-fetch of the join relation (one relation per distinct relation set
//! for the whole run), path population for each legal orientation, and partitionwise
//! decomposition when both inputs are partitioned.
//!
//! ## After a level
//!
//! Append paths are built over the child joins of partitionwise-joined relations and
//! each relation's cheapest path is selected. With a leading directive present, the
//! level is then pruned (see [`crate::prune`]).
//!
//! ## Termination
//!
//! The final level must contain exactly one relation: the join of everything.

use crate::config::SearchConfig;
use crate::error::{JoinSearchError, Result};
use crate::hint::{HintOracle, NoHints};
use crate::legality::{min_join_parameterization, Legality, LegalityChecker};
use crate::partition::{NoBoundMerge, PartitionBoundMerger, PartitionInfo};
use crate::paths::{JoinPathRequest, PathBuilder, UniqueSide};
use crate::prune::prune_level;
use crate::relation::{JoinRelation, RelHandle, RelKind, RelStore};
use crate::relids::RelIds;
use crate::restrict::{restriction_is_constant_false, RestrictInfo};
use crate::special_join::{JoinConstraints, JoinKind, SpecialJoinInfo};
use crate::translate::{AppendRelMap, AppendRelTranslator};
use std::sync::Arc;
use tracing::{debug, trace};

/// The join search engine for one planning run.
///
/// Owns the relation store and the level lists; collaborators are shared trait
/// objects so that independent runs can reuse them.
pub struct JoinSearch {
    pub(crate) store: RelStore,
    pub(crate) constraints: JoinConstraints,
    pub config: SearchConfig,
    pub(crate) paths: Arc<dyn PathBuilder>,
    pub(crate) hints: Arc<dyn HintOracle>,
    pub(crate) translator: Arc<dyn AppendRelTranslator>,
    pub(crate) bound_merger: Arc<dyn PartitionBoundMerger>,
    /// `levels[k]` lists the relations with `k` members; index 0 is unused.
    levels: Vec<Vec<RelHandle>>,
    /// Level new join relations are appended to.
    cur_level: usize,
}

impl JoinSearch {
    /// A search over relations already placed in `store`, with no hint directives,
    /// identity append-relation translation and positional partition matching only.
    pub fn new(
        store: RelStore,
        constraints: JoinConstraints,
        paths: Arc<dyn PathBuilder>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            constraints,
            config,
            paths,
            hints: Arc::new(NoHints),
            translator: Arc::new(AppendRelMap::new()),
            bound_merger: Arc::new(NoBoundMerge),
            levels: Vec::new(),
            cur_level: 0,
        }
    }

    pub fn with_hints(mut self, hints: Arc<dyn HintOracle>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn AppendRelTranslator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_bound_merger(mut self, bound_merger: Arc<dyn PartitionBoundMerger>) -> Self {
        self.bound_merger = bound_merger;
        self
    }

    pub fn store(&self) -> &RelStore {
        &self.store
    }

    pub fn into_store(self) -> RelStore {
        self.store
    }

    pub fn constraints(&self) -> &JoinConstraints {
        &self.constraints
    }

    /// Relations currently listed at `level` (empty for levels not built).
    pub fn level(&self, level: usize) -> &[RelHandle] {
        self.levels.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of relations per level, starting at level 1.
    pub fn level_sizes(&self) -> Vec<usize> {
        self.levels.iter().skip(1).map(Vec::len).collect()
    }

    /// Find the join of all `initial_rels`, building `levels_needed` levels.
    pub fn search(&mut self, levels_needed: usize, initial_rels: &[RelHandle]) -> Result<RelHandle> {
        self.validate(levels_needed, initial_rels)?;
        self.seed(levels_needed, initial_rels);

        debug!(
            "Starting join search: levels={}, special_joins={}, join_clauses={}, lateral={}",
            levels_needed,
            self.constraints.special_joins.len(),
            self.constraints.join_clauses.len(),
            self.constraints.has_lateral
        );

        for lev in 2..=levels_needed {
            self.cur_level = lev;
            self.join_search_one_level(lev)?;

            for handle in self.levels[lev].clone() {
                self.generate_partitionwise_join_paths(handle);
                self.store.get_mut(handle).set_cheapest();
            }

            let pruned = prune_level(
                &self.store,
                self.hints.as_ref(),
                lev,
                &self.levels[lev],
                self.config.disable_cost,
            );
            self.levels[lev] = pruned;

            debug!("Level {} complete: {} join relations", lev, self.levels[lev].len());
        }

        match self.levels[levels_needed].as_slice() {
            [] => Err(JoinSearchError::NoJoinsAtLevel {
                level: levels_needed,
            }),
            [only] => {
                let rel = self.store.get(*only);
                debug!(
                    "Join search complete: relids={}, cost={:.1}",
                    rel.relids,
                    rel.cheapest().map(|p| p.total_cost.total).unwrap_or(f64::NAN)
                );
                Ok(*only)
            }
            many => Err(JoinSearchError::FinalLevelNotConverged {
                level: levels_needed,
                count: many.len(),
                relids: many
                    .iter()
                    .map(|&h| self.store.get(h).relids.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    fn validate(&self, levels_needed: usize, initial_rels: &[RelHandle]) -> Result<()> {
        if levels_needed == 0 {
            return Err(JoinSearchError::InvalidInput("no relations to join".into()));
        }
        if initial_rels.len() != levels_needed {
            return Err(JoinSearchError::InvalidInput(format!(
                "{} levels requested for {} initial relations",
                levels_needed,
                initial_rels.len()
            )));
        }
        let mut seen = RelIds::empty();
        for &handle in initial_rels {
            if handle.0 >= self.store.len() {
                return Err(JoinSearchError::InvalidInput(format!(
                    "unknown relation {}",
                    handle
                )));
            }
            let relids = &self.store.get(handle).relids;
            if relids.is_empty() || relids.overlaps(&seen) {
                return Err(JoinSearchError::InvalidInput(format!(
                    "initial relation {} overlaps another initial relation",
                    relids
                )));
            }
            seen = seen.union(relids);
        }
        Ok(())
    }

    /// Fill level 1 and derive the reverse lateral sets.
    fn seed(&mut self, levels_needed: usize, initial_rels: &[RelHandle]) {
        self.levels = vec![Vec::new(); levels_needed + 1];
        self.levels[1] = initial_rels.to_vec();
        self.cur_level = 1;

        for &referencer in initial_rels {
            let rel = self.store.get(referencer);
            if rel.lateral_relids.is_empty() {
                continue;
            }
            self.constraints.has_lateral = true;
            let (relids, lateral) = (rel.relids.clone(), rel.lateral_relids.clone());
            for &referenced in initial_rels {
                let target = self.store.get_mut(referenced);
                if target.relids.overlaps(&lateral) {
                    target.lateral_referencers = target.lateral_referencers.union(&relids);
                }
            }
        }

        for &handle in initial_rels {
            let rel = self.store.get_mut(handle);
            if rel.cheapest().is_none() {
                rel.set_cheapest();
            }
        }
    }

    pub(crate) fn checker(&self) -> LegalityChecker<'_> {
        LegalityChecker::new(
            &self.constraints,
            self.paths.as_ref(),
            &self.store,
            self.level(1),
        )
    }

    /// Build every join relation of `level` members.
    fn join_search_one_level(&mut self, level: usize) -> Result<()> {
        let prev = self.levels[level - 1].clone();
        let initial = self.levels[1].clone();

        for (i, &old) in prev.iter().enumerate() {
            if self.is_linked(old) {
                // At level 2 the pairing is symmetric: only look at later relations.
                let others = if level == 2 { &prev[i + 1..] } else { &initial[..] };
                self.make_rels_by_clause_joins(old, others)?;
            } else {
                self.make_rels_by_clauseless_joins(old, &initial)?;
            }
        }

        for k in 2..=level / 2 {
            let other_level = level - k;
            let old_rels = self.levels[k].clone();
            let other_rels = self.levels[other_level].clone();

            for (i, &old) in old_rels.iter().enumerate() {
                let hinted = self.hints.is_hinted(&self.store.get(old).relids, None, true);
                if !self.is_linked(old) && !hinted {
                    continue;
                }
                let others = if k == other_level { &old_rels[i + 1..] } else { &other_rels[..] };
                self.make_rels_by_clause_joins(old, others)?;
            }
        }

        if self.levels[level].is_empty() {
            debug!("Level {}: no joins found, forcing cartesian products", level);
            for &old in &prev {
                self.make_rels_by_clauseless_joins(old, &initial)?;
            }
            if self.levels[level].is_empty()
                && self.constraints.special_joins.is_empty()
                && !self.constraints.has_lateral
            {
                return Err(JoinSearchError::NoJoinsAtLevel { level });
            }
        }
        Ok(())
    }

    /// Has join clauses or join-order restrictions tying it to other relations.
    fn is_linked(&self, handle: RelHandle) -> bool {
        let rel = self.store.get(handle);
        self.constraints.has_join_clauses(&rel.relids) || self.checker().has_join_restriction(rel)
    }

    fn make_rels_by_clause_joins(&mut self, old: RelHandle, others: &[RelHandle]) -> Result<()> {
        for &other in others {
            if self.should_pair(old, other) {
                self.make_join_rel(old, other)?;
            }
        }
        Ok(())
    }

    fn make_rels_by_clauseless_joins(&mut self, old: RelHandle, others: &[RelHandle]) -> Result<()> {
        for &other in others {
            if !self.store.get(old).relids.overlaps(&self.store.get(other).relids) {
                self.make_join_rel(old, other)?;
            }
        }
        Ok(())
    }

    fn should_pair(&self, a: RelHandle, b: RelHandle) -> bool {
        let (rel1, rel2) = (self.store.get(a), self.store.get(b));
        !rel1.relids.overlaps(&rel2.relids)
            && (self
                .constraints
                .have_relevant_joinclause(&rel1.relids, &rel2.relids)
                || self.checker().have_join_order_restriction(rel1, rel2)
                || self.hints.is_hinted(&rel1.relids, Some(&rel2.relids), true))
    }

    /// Join two relations if that is legal, building or fetching the join relation
    /// and adding paths to it. Returns `None` for illegal pairs.
    pub fn make_join_rel(&mut self, rel1: RelHandle, rel2: RelHandle) -> Result<Option<RelHandle>> {
        let (r1, r2) = (self.store.get(rel1), self.store.get(rel2));
        if r1.relids.overlaps(&r2.relids) {
            return Ok(None);
        }
        let decision = match self.checker().check_legality(r1, r2) {
            Legality::Illegal => return Ok(None),
            Legality::Legal(decision) => decision,
        };

        let (rel1, rel2) = if decision.reversed { (rel2, rel1) } else { (rel1, rel2) };
        let (r1, r2) = (self.store.get(rel1), self.store.get(rel2));

        let sjinfo = match decision.constraint {
            Some(id) => self.constraints.special_join(id).clone(),
            None => SpecialJoinInfo::inner(r1.relids.clone(), r2.relids.clone()),
        };
        let restrictions = self.constraints.restrictions_for(&r1.relids, &r2.relids);

        trace!(
            "make_join_rel: {} x {} kind={} unique_ified={}",
            r1.relids,
            r2.relids,
            decision.kind,
            decision.unique_ified
        );

        let joinrel = self.build_join_rel(rel1, rel2, &sjinfo, &restrictions);
        if self.store.get(joinrel).is_dummy {
            return Ok(Some(joinrel));
        }
        self.populate_join_rel(rel1, rel2, joinrel, &sjinfo, &restrictions, 0)?;
        Ok(Some(joinrel))
    }

    /// Fetch the join relation for `rel1 ∪ rel2`, creating it (and listing it at the
    /// current level) on first sight.
    fn build_join_rel(
        &mut self,
        rel1: RelHandle,
        rel2: RelHandle,
        sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
    ) -> RelHandle {
        let joinrelids = self.store.get(rel1).relids.union(&self.store.get(rel2).relids);
        if let Some(existing) = self.store.find(&joinrelids) {
            return existing;
        }
        let joinrel = self.new_join_relation(RelKind::Join, joinrelids, rel1, rel2, sjinfo, restrictions);
        let handle = self.store.insert(joinrel);
        if let Some(level) = self.levels.get_mut(self.cur_level) {
            level.push(handle);
        }
        handle
    }

    /// Child join between two partitions; cached like any relation but never listed
    /// at a level.
    pub(crate) fn build_child_join_rel(
        &mut self,
        child1: RelHandle,
        child2: RelHandle,
        sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
    ) -> RelHandle {
        let joinrelids = self.store.get(child1).relids.union(&self.store.get(child2).relids);
        if let Some(existing) = self.store.find(&joinrelids) {
            return existing;
        }
        let joinrel =
            self.new_join_relation(RelKind::OtherJoin, joinrelids, child1, child2, sjinfo, restrictions);
        self.store.insert(joinrel)
    }

    fn new_join_relation(
        &self,
        kind: RelKind,
        joinrelids: RelIds,
        rel1: RelHandle,
        rel2: RelHandle,
        sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
    ) -> JoinRelation {
        let (r1, r2) = (self.store.get(rel1), self.store.get(rel2));
        let mut joinrel = JoinRelation::new(kind, joinrelids, format!("({} {})", r1.name, r2.name));
        joinrel.lateral_relids = min_join_parameterization(&joinrel.relids, r1, r2);
        joinrel.direct_lateral_relids = r1
            .direct_lateral_relids
            .union(&r2.direct_lateral_relids)
            .difference(&joinrel.relids);
        joinrel.rows = self.paths.estimate_rows(r1, r2, sjinfo, restrictions);
        joinrel.partition = self.joinrel_partition_info(r1, r2, sjinfo, restrictions);
        joinrel.consider_partitionwise = joinrel.partition.is_some();
        joinrel
    }

    /// Partition metadata for a new join relation: unresolved if the inputs can be
    /// joined partitionwise at all, `None` otherwise.
    fn joinrel_partition_info(
        &self,
        r1: &JoinRelation,
        r2: &JoinRelation,
        sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
    ) -> Option<PartitionInfo> {
        if !self.config.enable_partitionwise_join
            || !r1.is_partitioned()
            || !r2.is_partitioned()
            || !r1.consider_partitionwise
            || !r2.consider_partitionwise
        {
            return None;
        }
        let scheme = r1.scheme()?;
        if r2.scheme() != Some(scheme)
            || !self.paths.partitionwise_eligible(r1, r2, sjinfo, restrictions)
        {
            return None;
        }
        Some(PartitionInfo::unresolved(scheme))
    }

    /// Add paths for joining `rel1` and `rel2` into `joinrel`, or prove it empty.
    ///
    /// `rel1` is the constraint's left-hand input. The rules for empty inputs follow
    /// null-extension: an empty nullable side does not empty an outer join.
    pub(crate) fn populate_join_rel(
        &mut self,
        rel1: RelHandle,
        rel2: RelHandle,
        joinrel: RelHandle,
        sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
        depth: usize,
    ) -> Result<()> {
        let joinrelids = self.store.get(joinrel).relids.clone();
        let rel1_dummy = self.store.get(rel1).is_dummy;
        let rel2_dummy = self.store.get(rel2).is_dummy;
        let false_anywhere = restriction_is_constant_false(restrictions, &joinrelids, false);
        let false_pushed_down = restriction_is_constant_false(restrictions, &joinrelids, true);

        let request = |kind, swapped, unique| JoinPathRequest {
            kind,
            sjinfo,
            restrictions,
            swapped,
            unique,
        };

        let mut dummy = false;
        match sjinfo.kind {
            JoinKind::Inner => {
                if rel1_dummy || rel2_dummy || false_anywhere {
                    dummy = true;
                } else {
                    self.add_join_paths(joinrel, rel1, rel2, &request(JoinKind::Inner, false, UniqueSide::None));
                    self.add_join_paths(joinrel, rel2, rel1, &request(JoinKind::Inner, true, UniqueSide::None));
                }
            }
            JoinKind::Left => {
                if rel1_dummy || false_pushed_down {
                    dummy = true;
                } else {
                    // A false ON clause leaves only null-extended rows.
                    if false_anywhere && self.store.get(rel2).relids.is_subset_of(&sjinfo.syn_righthand) {
                        self.store.get_mut(rel2).mark_dummy();
                    }
                    self.add_join_paths(joinrel, rel1, rel2, &request(JoinKind::Left, false, UniqueSide::None));
                    self.add_join_paths(joinrel, rel2, rel1, &request(JoinKind::Left, true, UniqueSide::None));
                }
            }
            JoinKind::Full => {
                if (rel1_dummy && rel2_dummy) || false_pushed_down {
                    dummy = true;
                } else {
                    self.add_join_paths(joinrel, rel1, rel2, &request(JoinKind::Full, false, UniqueSide::None));
                    self.add_join_paths(joinrel, rel2, rel1, &request(JoinKind::Full, true, UniqueSide::None));
                }
            }
            JoinKind::Semi => {
                let (r1, r2) = (self.store.get(rel1), self.store.get(rel2));
                let direct = sjinfo.min_lefthand.is_subset_of(&r1.relids)
                    && sjinfo.min_righthand.is_subset_of(&r2.relids);
                let unique = sjinfo.syn_righthand == r2.relids
                    && self.paths.unique_path(r2, sjinfo).is_some();
                let empty = rel1_dummy || rel2_dummy || false_anywhere;

                if (direct || unique) && empty {
                    dummy = true;
                } else {
                    if direct {
                        self.add_join_paths(joinrel, rel1, rel2, &request(JoinKind::Semi, false, UniqueSide::None));
                    }
                    if unique {
                        self.add_join_paths(joinrel, rel1, rel2, &request(JoinKind::Inner, false, UniqueSide::Inner));
                        self.add_join_paths(joinrel, rel2, rel1, &request(JoinKind::Inner, true, UniqueSide::Outer));
                    }
                }
            }
            JoinKind::Anti => {
                if rel1_dummy || false_pushed_down {
                    dummy = true;
                } else {
                    if false_anywhere && self.store.get(rel2).relids.is_subset_of(&sjinfo.syn_righthand) {
                        self.store.get_mut(rel2).mark_dummy();
                    }
                    self.add_join_paths(joinrel, rel1, rel2, &request(JoinKind::Anti, false, UniqueSide::None));
                }
            }
        }

        if dummy {
            trace!("join relation {} proven empty", joinrelids);
            self.store.get_mut(joinrel).mark_dummy();
        }

        self.try_partitionwise_join(rel1, rel2, joinrel, sjinfo, restrictions, depth)
    }

    fn add_join_paths(
        &mut self,
        joinrel: RelHandle,
        outer: RelHandle,
        inner: RelHandle,
        request: &JoinPathRequest<'_>,
    ) {
        let paths = self.paths.join_paths(
            self.store.get(joinrel),
            self.store.get(outer),
            self.store.get(inner),
            request,
        );
        let rel = self.store.get_mut(joinrel);
        for path in paths {
            rel.add_path(path);
        }
    }
}
