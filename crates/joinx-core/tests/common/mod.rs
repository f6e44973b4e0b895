//! Deterministic collaborators and fixture builders shared by the integration suites.

#![allow(dead_code)]

use joinx_core::config::SearchConfig;
use joinx_core::cost::Cost;
use joinx_core::error::Result;
use joinx_core::hint::HintOracle;
use joinx_core::partition::{
    BoundValue, MergedBounds, PartitionBoundMerger, PartitionBounds, PartitionInfo, PartitionSchemeId,
    PartitionStrategy,
};
use joinx_core::paths::{JoinPathRequest, PathBuilder, UniqueSide};
use joinx_core::relation::{JoinRelation, Path, PathKind, RelHandle, RelKind, RelStore};
use joinx_core::relids::RelIds;
use joinx_core::restrict::RestrictInfo;
use joinx_core::search::JoinSearch;
use joinx_core::special_join::{JoinConstraints, JoinKind, SpecialJoinId, SpecialJoinInfo};
use joinx_core::translate::{AppendRelInfo, AppendRelMap};
use std::sync::Arc;

pub const DISABLE_COST: f64 = 1.0e10;

pub fn set(ids: &[usize]) -> RelIds {
    ids.iter().copied().collect()
}

// ---------------------------------------------------------------------------
// Fake path builder
// ---------------------------------------------------------------------------

/// Builds one hash-join-shaped path per request. Costs are the sum of the inputs'
/// cheapest costs plus a size term, so they are deterministic and symmetric.
#[derive(Default, Clone)]
pub struct FakePaths {
    unique: Vec<RelIds>,
    hinted_pairs: Vec<(RelIds, RelIds)>,
    /// Price every join that is not hinted (and not on top of a hinted one) at the
    /// disable cost, the way a leading directive disables conflicting joins.
    disable_unhinted: bool,
}

impl FakePaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unique(mut self, relids: RelIds) -> Self {
        self.unique.push(relids);
        self
    }

    pub fn with_leading(mut self, pairs: &[(RelIds, RelIds)]) -> Self {
        self.hinted_pairs.extend_from_slice(pairs);
        self.disable_unhinted = true;
        self
    }

    fn is_hinted_pair(&self, a: &RelIds, b: &RelIds) -> bool {
        self.hinted_pairs
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

fn cheapest_cost(rel: &JoinRelation) -> Cost {
    rel.cheapest().map(|p| p.total_cost).unwrap_or_else(Cost::infinite)
}

impl PathBuilder for FakePaths {
    fn estimate_rows(
        &self,
        rel1: &JoinRelation,
        rel2: &JoinRelation,
        _sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
    ) -> f64 {
        let product = rel1.rows * rel2.rows;
        if restrictions.is_empty() {
            product
        } else {
            (product * 0.01).max(1.0)
        }
    }

    fn join_paths(
        &self,
        joinrel: &JoinRelation,
        outer: &JoinRelation,
        inner: &JoinRelation,
        request: &JoinPathRequest<'_>,
    ) -> Vec<Path> {
        let hinted = self.is_hinted_pair(&outer.relids, &inner.relids);
        let below = [outer, inner]
            .iter()
            .any(|r| r.cheapest().is_some_and(|p| p.carries_hint()));

        let mut cost = cheapest_cost(outer)
            .plus(cheapest_cost(inner))
            .plus(Cost::new(outer.rows * inner.rows * 0.01 + joinrel.rows));
        if self.disable_unhinted && !hinted && !below {
            cost = cost.plus(Cost::new(DISABLE_COST));
        }

        let kind = match request.unique {
            UniqueSide::None => PathKind::HashJoin,
            UniqueSide::Inner => PathKind::UniqueInner,
            UniqueSide::Outer => PathKind::UniqueOuter,
        };
        vec![Path::join(
            kind,
            request.kind,
            cost,
            joinrel.rows,
            outer.relids.clone(),
            inner.relids.clone(),
        )
        .hinted(hinted, below)]
    }

    fn unique_path(&self, rel: &JoinRelation, _sjinfo: &SpecialJoinInfo) -> Option<Path> {
        if !self.unique.contains(&rel.relids) {
            return None;
        }
        let mut path = Path::scan(cheapest_cost(rel).plus(Cost::new(rel.rows)), rel.rows);
        path.kind = PathKind::Unique;
        Some(path)
    }

    fn append_paths(&self, joinrel: &JoinRelation, children: &[&JoinRelation]) -> Vec<Path> {
        let total = children
            .iter()
            .fold(Cost::zero(), |acc, child| acc.plus(cheapest_cost(child)));
        let mut path = Path::scan(total, joinrel.rows);
        path.kind = PathKind::Append;
        path.has_hinted_descendant = children
            .iter()
            .any(|c| c.cheapest().is_some_and(|p| p.carries_hint()));
        vec![path]
    }
}

// ---------------------------------------------------------------------------
// Fake hint oracle
// ---------------------------------------------------------------------------

pub struct FakeHints {
    pairs: Vec<(RelIds, RelIds)>,
}

impl FakeHints {
    pub fn leading(pairs: &[(RelIds, RelIds)]) -> Self {
        Self {
            pairs: pairs.to_vec(),
        }
    }
}

impl HintOracle for FakeHints {
    fn has_leading_hint(&self) -> bool {
        !self.pairs.is_empty()
    }

    fn is_hinted(&self, outer: &RelIds, inner: Option<&RelIds>, try_swapped: bool) -> bool {
        self.pairs.iter().any(|(a, b)| match inner {
            None => a == outer || b == outer,
            Some(inner) => (a == outer && b == inner) || (try_swapped && a == inner && b == outer),
        })
    }
}

// ---------------------------------------------------------------------------
// Fake bound merger
// ---------------------------------------------------------------------------

/// Pairs partitions by position and keeps the left input's bounds; always reports the
/// result as merged.
pub struct PositionalMerger;

impl PartitionBoundMerger for PositionalMerger {
    fn merge(
        &self,
        _scheme: PartitionSchemeId,
        rel1: &JoinRelation,
        rel2: &JoinRelation,
        _kind: JoinKind,
    ) -> Option<MergedBounds> {
        let (p1, p2) = (rel1.partition.as_ref()?, rel2.partition.as_ref()?);
        let n = p1.parts.len().max(p2.parts.len());
        let pairs = (0..n)
            .map(|i| (p1.parts.get(i).copied().flatten(), p2.parts.get(i).copied().flatten()))
            .collect();
        Some(MergedBounds {
            bounds: p1.bounds.clone()?,
            pairs,
        })
    }
}

/// Merger returning a fixed pairing.
pub struct FixedMerger(pub Vec<(Option<RelHandle>, Option<RelHandle>)>);

impl PartitionBoundMerger for FixedMerger {
    fn merge(
        &self,
        _scheme: PartitionSchemeId,
        rel1: &JoinRelation,
        _rel2: &JoinRelation,
        _kind: JoinKind,
    ) -> Option<MergedBounds> {
        Some(MergedBounds {
            bounds: rel1.partition.as_ref()?.bounds.clone()?,
            pairs: self.0.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// One partition slot of a partitioned base relation.
#[derive(Clone, Copy)]
pub enum Slot {
    /// A partition with rows, identified by its relid.
    Live(usize),
    /// A partition proven empty.
    Empty(usize),
    /// A partition pruned away entirely.
    Pruned,
}

pub struct Fixture {
    pub store: RelStore,
    pub constraints: JoinConstraints,
    pub appinfos: AppendRelMap,
    pub initial: Vec<RelHandle>,
    pub config: SearchConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: RelStore::new(),
            constraints: JoinConstraints::new(),
            appinfos: AppendRelMap::new(),
            initial: Vec::new(),
            config: SearchConfig::default(),
        }
    }

    pub fn base(&mut self, id: usize, name: &str, rows: f64) -> RelHandle {
        let handle = self.store.insert(JoinRelation::base(id, name, rows, Cost::new(rows)));
        self.initial.push(handle);
        handle
    }

    /// A relation that laterally references `refs` (directly) and `indirect`.
    pub fn lateral(&mut self, id: usize, name: &str, rows: f64, refs: &[usize], indirect: &[usize]) -> RelHandle {
        let mut rel = JoinRelation::base(id, name, rows, Cost::new(rows)).with_lateral(set(refs));
        rel.lateral_relids = rel.lateral_relids.union(&set(indirect));
        let handle = self.store.insert(rel);
        self.initial.push(handle);
        handle
    }

    pub fn mark_dummy(&mut self, handle: RelHandle) {
        self.store.get_mut(handle).mark_dummy();
    }

    pub fn clause(&mut self, label: &str, ids: &[usize]) {
        self.constraints.add_join_clause(RestrictInfo::new(label, set(ids)));
    }

    pub fn restriction(&mut self, rinfo: RestrictInfo) {
        self.constraints.add_join_clause(rinfo);
    }

    pub fn special(&mut self, kind: JoinKind, left: &[usize], right: &[usize]) -> SpecialJoinId {
        self.constraints
            .add_special_join(SpecialJoinInfo::new(kind, set(left), set(right)))
    }

    pub fn strict_left(&mut self, left: &[usize], right: &[usize]) -> SpecialJoinId {
        self.constraints
            .add_special_join(SpecialJoinInfo::new(JoinKind::Left, set(left), set(right)).strict())
    }

    /// A placeholder expression computable only once all of `eval_at` is joined.
    pub fn placeholder(&mut self, eval_at: &[usize]) {
        self.constraints.add_placeholder(set(eval_at));
    }

    /// A list-partitioned relation: partition `i` accepts `datums[i]`.
    pub fn partitioned(
        &mut self,
        id: usize,
        name: &str,
        scheme: PartitionSchemeId,
        datums: &[i64],
        slots: &[Slot],
    ) -> RelHandle {
        let rel = self.partitioned_rel(RelKind::Base, id, name, scheme, datums, slots);
        let handle = self.store.insert(rel);
        self.initial.push(handle);
        handle
    }

    /// A partition `child` of `parent` that is itself list-partitioned.
    pub fn sub_partitioned(
        &mut self,
        parent: (usize, &str),
        child: usize,
        scheme: PartitionSchemeId,
        datums: &[i64],
        slots: &[Slot],
    ) -> RelHandle {
        let name = format!("{}_{}", parent.1, child);
        let rel = self.partitioned_rel(RelKind::OtherMember, child, &name, scheme, datums, slots);
        self.link(parent.0, parent.1, child, &name);
        self.store.insert(rel)
    }

    fn partitioned_rel(
        &mut self,
        kind: RelKind,
        id: usize,
        name: &str,
        scheme: PartitionSchemeId,
        datums: &[i64],
        slots: &[Slot],
    ) -> JoinRelation {
        let mut parts = Vec::with_capacity(slots.len());
        let mut all_partrels = RelIds::empty();
        for slot in slots {
            match *slot {
                Slot::Live(cid) | Slot::Empty(cid) => {
                    let handle = match self.store.find(&RelIds::singleton(cid)) {
                        Some(existing) => existing,
                        None => {
                            let cname = format!("{}_{}", name, cid);
                            let mut child = JoinRelation::new(RelKind::OtherMember, RelIds::singleton(cid), cname.clone());
                            child.rows = 100.0;
                            child.add_path(Path::scan(Cost::new(100.0), 100.0));
                            child.set_cheapest();
                            child.consider_partitionwise = true;
                            if matches!(slot, Slot::Empty(_)) {
                                child.mark_dummy();
                            }
                            self.link(id, name, cid, &cname);
                            self.store.insert(child)
                        }
                    };
                    all_partrels = all_partrels.union(&self.store.get(handle).relids);
                    parts.push(Some(handle));
                }
                Slot::Pruned => parts.push(None),
            }
        }

        let bounds = PartitionBounds {
            strategy: PartitionStrategy::List,
            datums: datums.iter().map(|&d| vec![BoundValue::Int(d)]).collect(),
        };
        let mut rel = JoinRelation::new(kind, RelIds::singleton(id), name);
        rel.rows = 100.0 * slots.len() as f64;
        rel.add_path(Path::scan(Cost::new(rel.rows), rel.rows));
        rel.set_cheapest();
        rel.consider_partitionwise = true;
        rel.partition = Some(PartitionInfo::for_base(scheme, bounds, parts, all_partrels));
        rel
    }

    fn link(&mut self, parent: usize, parent_name: &str, child: usize, child_name: &str) {
        self.appinfos.add(AppendRelInfo {
            parent_relid: parent,
            child_relid: child,
            parent_name: parent_name.into(),
            child_name: child_name.into(),
        });
    }

    pub fn build(self, paths: FakePaths) -> (JoinSearch, Vec<RelHandle>) {
        let search = JoinSearch::new(self.store, self.constraints, Arc::new(paths), self.config)
            .with_translator(Arc::new(self.appinfos));
        (search, self.initial)
    }

    /// Run the search over all initial relations.
    pub fn run(self, paths: FakePaths) -> (JoinSearch, Result<RelHandle>) {
        self.run_with(paths, |s| s)
    }

    pub fn run_with(
        self,
        paths: FakePaths,
        configure: impl FnOnce(JoinSearch) -> JoinSearch,
    ) -> (JoinSearch, Result<RelHandle>) {
        let (search, initial) = self.build(paths);
        let mut search = configure(search);
        let result = search.search(initial.len(), &initial);
        (search, result)
    }
}

/// Relids of every relation at `level`, in level order.
pub fn level_relids(search: &JoinSearch, level: usize) -> Vec<RelIds> {
    search
        .level(level)
        .iter()
        .map(|&h| search.store().get(h).relids.clone())
        .collect()
}
