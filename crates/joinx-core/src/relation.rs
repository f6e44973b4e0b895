//! # Join Relations and the Relation Store
//!
//! A [`JoinRelation`] stands for one relation set: a base relation, a partition of a
//! base relation, or some grouping of base relations produced by the search. Every
//! way of producing a given set adds its paths to the *same* relation, so the store
//! keeps a cache keyed by [`RelIds`] and hands out [`RelHandle`]s into an arena.
//!
//! ## Lifecycle
//!
//! Relations are created once per distinct relation set per planning run and are never
//! removed; the whole store is dropped when the run ends. Handles are plain indexes and
//! stay valid for the lifetime of the store.
//!
//! ## Paths
//!
//! Paths are opaque implementations proposed by the [`crate::paths::PathBuilder`]
//! collaborator. The relation keeps all of them, in proposal order; `set_cheapest`
//! picks the one with the lowest total cost once a level is complete.

use crate::cost::Cost;
use crate::partition::{PartitionInfo, PartitionSchemeId};
use crate::relids::RelIds;
use crate::special_join::JoinKind;
use std::collections::HashMap;
use std::fmt;

/// Index of a relation in a [`RelStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelHandle(pub usize);

impl fmt::Display for RelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a relation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    /// A base relation or other single jointree item.
    Base,
    /// A join of two or more jointree items.
    Join,
    /// A partition of a base relation.
    OtherMember,
    /// A join between partitions, produced by partitionwise decomposition.
    OtherJoin,
}

impl RelKind {
    /// Base relations and their partitions: members of exactly one table.
    pub fn is_simple(self) -> bool {
        matches!(self, RelKind::Base | RelKind::OtherMember)
    }
}

/// Implementation strategy of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Scan,
    NestLoop,
    HashJoin,
    MergeJoin,
    /// Inner join against a de-duplicated inner input.
    UniqueInner,
    /// Inner join with a de-duplicated outer input.
    UniqueOuter,
    /// Unique-ification of a single relation.
    Unique,
    /// Concatenation of per-partition child join paths.
    Append,
    /// A relation proven to produce no rows.
    Empty,
}

/// One way of producing a relation's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub kind: PathKind,
    pub join_kind: Option<JoinKind>,
    pub total_cost: Cost,
    pub rows: f64,
    /// Relation set on the outer (probe/driving) side, for join paths.
    pub outer: Option<RelIds>,
    /// Relation set on the inner side, for join paths.
    pub inner: Option<RelIds>,
    /// The path joins a pair named by a hint directive.
    pub is_hinted: bool,
    /// Some input path below this one is hinted.
    pub has_hinted_descendant: bool,
}

impl Path {
    pub fn scan(total_cost: Cost, rows: f64) -> Self {
        Self {
            kind: PathKind::Scan,
            join_kind: None,
            total_cost,
            rows,
            outer: None,
            inner: None,
            is_hinted: false,
            has_hinted_descendant: false,
        }
    }

    pub fn join(
        kind: PathKind,
        join_kind: JoinKind,
        total_cost: Cost,
        rows: f64,
        outer: RelIds,
        inner: RelIds,
    ) -> Self {
        Self {
            kind,
            join_kind: Some(join_kind),
            total_cost,
            rows,
            outer: Some(outer),
            inner: Some(inner),
            is_hinted: false,
            has_hinted_descendant: false,
        }
    }

    /// The zero-cost path a dummy relation carries.
    pub fn empty() -> Self {
        Self {
            kind: PathKind::Empty,
            join_kind: None,
            total_cost: Cost::zero(),
            rows: 0.0,
            outer: None,
            inner: None,
            is_hinted: false,
            has_hinted_descendant: false,
        }
    }

    pub fn hinted(mut self, is_hinted: bool, has_hinted_descendant: bool) -> Self {
        self.is_hinted = is_hinted;
        self.has_hinted_descendant = has_hinted_descendant;
        self
    }

    pub fn is_join(&self) -> bool {
        self.outer.is_some() && self.inner.is_some()
    }

    /// Hinted itself or built on top of a hinted path.
    pub fn carries_hint(&self) -> bool {
        self.is_hinted || self.has_hinted_descendant
    }
}

/// A relation set together with everything discovered about producing it.
#[derive(Debug, Clone)]
pub struct JoinRelation {
    pub relids: RelIds,
    pub kind: RelKind,
    /// Diagnostic name (table alias for base relations).
    pub name: String,
    pub rows: f64,
    pub paths: Vec<Path>,
    cheapest: Option<usize>,
    pub is_dummy: bool,
    /// The relation may take part in partitionwise joins.
    pub consider_partitionwise: bool,
    /// Relations this one laterally references, directly or indirectly.
    pub lateral_relids: RelIds,
    /// Relations this one laterally references directly.
    pub direct_lateral_relids: RelIds,
    /// Relations that laterally reference this one.
    pub lateral_referencers: RelIds,
    pub partition: Option<PartitionInfo>,
}

impl JoinRelation {
    pub fn new(kind: RelKind, relids: RelIds, name: impl Into<String>) -> Self {
        Self {
            relids,
            kind,
            name: name.into(),
            rows: 0.0,
            paths: Vec::new(),
            cheapest: None,
            is_dummy: false,
            consider_partitionwise: false,
            lateral_relids: RelIds::empty(),
            direct_lateral_relids: RelIds::empty(),
            lateral_referencers: RelIds::empty(),
            partition: None,
        }
    }

    /// A base relation for seeding level 1, with a single scan path.
    pub fn base(id: usize, name: impl Into<String>, rows: f64, scan_cost: Cost) -> Self {
        let mut rel = Self::new(RelKind::Base, RelIds::singleton(id), name);
        rel.rows = rows;
        rel.add_path(Path::scan(scan_cost, rows));
        rel.set_cheapest();
        rel
    }

    /// Record a lateral reference to `referenced`. Callers seeding indirect references
    /// extend `lateral_relids` directly.
    pub fn with_lateral(mut self, referenced: RelIds) -> Self {
        self.lateral_relids = self.lateral_relids.union(&referenced);
        self.direct_lateral_relids = self.direct_lateral_relids.union(&referenced);
        self
    }

    pub fn add_path(&mut self, path: Path) {
        self.paths.push(path);
    }

    /// Pick the cheapest path; ties keep the earliest proposal.
    pub fn set_cheapest(&mut self) {
        let mut best: Option<usize> = None;
        for (i, path) in self.paths.iter().enumerate() {
            match best {
                Some(b) if !(path.total_cost < self.paths[b].total_cost) => {}
                _ => best = Some(i),
            }
        }
        self.cheapest = best;
    }

    pub fn cheapest(&self) -> Option<&Path> {
        self.cheapest.map(|i| &self.paths[i])
    }

    /// Mark the relation as producing no rows. Its paths are replaced by one empty path.
    pub fn mark_dummy(&mut self) {
        self.is_dummy = true;
        self.paths.clear();
        self.paths.push(Path::empty());
        self.cheapest = Some(0);
    }

    /// Partitioned with resolved, non-empty bounds and at least one partition.
    pub fn is_partitioned(&self) -> bool {
        !self.is_dummy
            && self
                .partition
                .as_ref()
                .is_some_and(|p| p.bounds.is_some() && p.nparts.is_some_and(|n| n > 0))
    }

    pub fn scheme(&self) -> Option<PartitionSchemeId> {
        self.partition.as_ref().map(|p| p.scheme)
    }
}

/// Arena of relations with the per-run cache from relation set to relation.
#[derive(Debug, Default)]
pub struct RelStore {
    rels: Vec<JoinRelation>,
    by_relids: HashMap<RelIds, RelHandle>,
}

impl RelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relation and register it under its relids. An existing relation with the
    /// same relids keeps its cache entry.
    pub fn insert(&mut self, rel: JoinRelation) -> RelHandle {
        let handle = RelHandle(self.rels.len());
        self.by_relids.entry(rel.relids.clone()).or_insert(handle);
        self.rels.push(rel);
        handle
    }

    pub fn find(&self, relids: &RelIds) -> Option<RelHandle> {
        self.by_relids.get(relids).copied()
    }

    pub fn get(&self, handle: RelHandle) -> &JoinRelation {
        &self.rels[handle.0]
    }

    pub fn get_mut(&mut self, handle: RelHandle) -> &mut JoinRelation {
        &mut self.rels[handle.0]
    }

    pub fn len(&self) -> usize {
        self.rels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RelHandle, &JoinRelation)> {
        self.rels.iter().enumerate().map(|(i, r)| (RelHandle(i), r))
    }

    /// Walk cheapest paths down from `handle` to produce a join tree.
    ///
    /// Unique-ified inputs, append paths and relations without a cheapest path end the
    /// walk at that relation.
    pub fn best_tree(&self, handle: RelHandle) -> Option<PlanTree> {
        let rel = self.get(handle);
        let path = rel.cheapest()?;
        match (&path.outer, &path.inner, path.join_kind) {
            (Some(outer), Some(inner), Some(join_kind)) => {
                let outer_tree = self.subtree(outer)?;
                let inner_tree = self.subtree(inner)?;
                Some(PlanTree::Join {
                    relids: rel.relids.clone(),
                    kind: path.kind,
                    join_kind,
                    cost: path.total_cost,
                    outer: Box::new(outer_tree),
                    inner: Box::new(inner_tree),
                })
            }
            _ => Some(PlanTree::Leaf {
                relids: rel.relids.clone(),
                name: rel.name.clone(),
                kind: path.kind,
                cost: path.total_cost,
            }),
        }
    }

    fn subtree(&self, relids: &RelIds) -> Option<PlanTree> {
        self.find(relids).and_then(|h| self.best_tree(h))
    }
}

/// Join tree extracted from cheapest paths.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanTree {
    Leaf {
        relids: RelIds,
        name: String,
        kind: PathKind,
        cost: Cost,
    },
    Join {
        relids: RelIds,
        kind: PathKind,
        join_kind: JoinKind,
        cost: Cost,
        outer: Box<PlanTree>,
        inner: Box<PlanTree>,
    },
}

impl PlanTree {
    pub fn relids(&self) -> &RelIds {
        match self {
            PlanTree::Leaf { relids, .. } | PlanTree::Join { relids, .. } => relids,
        }
    }

    pub fn cost(&self) -> Cost {
        match self {
            PlanTree::Leaf { cost, .. } | PlanTree::Join { cost, .. } => *cost,
        }
    }

    /// Indented multi-line rendering for logs and test output.
    pub fn display(&self, indent: usize) -> String {
        let pad = "  ".repeat(indent);
        match self {
            PlanTree::Leaf { name, kind, cost, .. } => {
                format!("{pad}{kind:?}({name}) cost={:.1}\n", cost.total)
            }
            PlanTree::Join {
                kind,
                join_kind,
                cost,
                outer,
                inner,
                ..
            } => {
                let mut out = format!("{pad}{kind:?} {join_kind} cost={:.1}\n", cost.total);
                out.push_str(&outer.display(indent + 1));
                out.push_str(&inner.display(indent + 1));
                out
            }
        }
    }
}
