//! # Partition Metadata
//!
//! Partitioned relations carry a [`PartitionInfo`]: which partitioning scheme they
//! follow, their boundary descriptor, and one slot per partition pointing at the child
//! relation for that partition (or nothing, if the partition was pruned).
//!
//! Join relations start out with an unknown partition count. The partitionwise
//! decomposer resolves it the first time a pair of partitioned inputs is joined:
//! either by positional pairing (identical bounds) or through a
//! [`PartitionBoundMerger`], whose arithmetic is outside the core.

use crate::relation::{JoinRelation, RelHandle};
use crate::relids::RelIds;
use crate::special_join::JoinKind;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Identity of a partitioning scheme (strategy, key types, collations). Two relations
/// can only be joined partitionwise if they share one.
pub type PartitionSchemeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStrategy {
    List,
    Range,
    Hash,
}

/// A single boundary datum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
}

/// Boundary descriptor. `datums[i]` describes partition `i`: the accepted values for
/// list partitioning, `[lower, upper)` for range, `[modulus, remainder]` for hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionBounds {
    pub strategy: PartitionStrategy,
    pub datums: Vec<Vec<BoundValue>>,
}

impl PartitionBounds {
    pub fn num_partitions(&self) -> usize {
        self.datums.len()
    }
}

/// Partitioning state of a relation.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub scheme: PartitionSchemeId,
    /// `None` until bounds are resolved for a join relation; `Some(0)` once the
    /// relation has been marked unpartitioned.
    pub nparts: Option<usize>,
    pub bounds: Option<PartitionBounds>,
    /// Child relation per partition slot; `None` for pruned or ignored segments.
    pub parts: Vec<Option<RelHandle>>,
    /// Bounds were produced by merging rather than structural equality, so partition
    /// pairs must be looked up explicitly rather than by position.
    pub merged: bool,
    /// Union of the relids of every child relation.
    pub all_partrels: RelIds,
    /// Slots holding a constructed child relation.
    pub live_parts: Vec<usize>,
}

impl PartitionInfo {
    /// Partition metadata for a seeded base relation with known children.
    pub fn for_base(
        scheme: PartitionSchemeId,
        bounds: PartitionBounds,
        parts: Vec<Option<RelHandle>>,
        all_partrels: RelIds,
    ) -> Self {
        let live_parts = parts
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|_| i))
            .collect();
        Self {
            scheme,
            nparts: Some(parts.len()),
            bounds: Some(bounds),
            parts,
            merged: false,
            all_partrels,
            live_parts,
        }
    }

    /// Metadata for a join relation whose bounds have yet to be computed.
    pub fn unresolved(scheme: PartitionSchemeId) -> Self {
        Self {
            scheme,
            nparts: None,
            bounds: None,
            parts: Vec::new(),
            merged: false,
            all_partrels: RelIds::empty(),
            live_parts: Vec::new(),
        }
    }

    /// Give up on partitionwise joining for this relation.
    pub fn mark_unpartitioned(&mut self) {
        self.nparts = Some(0);
    }
}

/// Result of merging two inputs' bounds: the join relation's bounds and, per merged
/// slot, the input child relations that form it.
#[derive(Debug, Clone)]
pub struct MergedBounds {
    pub bounds: PartitionBounds,
    pub pairs: Vec<(Option<RelHandle>, Option<RelHandle>)>,
}

/// Computes merged partition bounds for two inputs with different boundary sets.
pub trait PartitionBoundMerger: Send + Sync {
    /// Returns `None` when the inputs cannot be partition-aligned for `kind`.
    fn merge(
        &self,
        scheme: PartitionSchemeId,
        rel1: &JoinRelation,
        rel2: &JoinRelation,
        kind: JoinKind,
    ) -> Option<MergedBounds>;
}

/// Merger that never succeeds: only structurally identical bounds are joined
/// partitionwise.
#[derive(Debug, Default)]
pub struct NoBoundMerge;

impl PartitionBoundMerger for NoBoundMerge {
    fn merge(
        &self,
        _scheme: PartitionSchemeId,
        _rel1: &JoinRelation,
        _rel2: &JoinRelation,
        _kind: JoinKind,
    ) -> Option<MergedBounds> {
        None
    }
}
