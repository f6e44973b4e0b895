//! # Partitionwise Join Decomposition
//!
//! When both inputs of a join are partitioned the same way, the join can run as a
//! union of joins between matching partitions. This module builds those child joins
//! and, once a level is complete, the append paths that stitch them back together.
//!
//! ## Matching partitions
//!
//! The first time a partitioned join relation is reached, its partition bounds are
//! resolved: inputs with identical unmerged bounds pair partitions by position;
//! otherwise the [`crate::partition::PartitionBoundMerger`] collaborator computes
//! merged bounds along with the explicit input pairs for each merged slot. Merged join
//! relations later recover their pairs from the child joins already built.
//!
//! ## Empty segments
//!
//! A slot whose inputs are missing or empty contributes nothing when the join kind
//! would not null-extend them:
//!
//! | Join kind    | Segment skipped when        |
//! |--------------|-----------------------------|
//! | Inner, Semi  | either side is empty        |
//! | Left, Anti   | the left side is empty      |
//! | Full         | both sides are empty        |
//!
//! A slot that is not skipped but lacks a child relation cannot be decomposed; the
//! join relation is then marked unpartitioned and is joined as a whole.
//!
//! Child joins are populated like any join and may themselves be partitioned,
//! so decomposition recurses. Nesting deeper than
//! [`crate::config::SearchConfig::max_partition_depth`] fails the run.

use crate::error::{JoinSearchError, Result};
use crate::relation::{JoinRelation, RelHandle};
use crate::relids::RelIds;
use crate::restrict::RestrictInfo;
use crate::search::JoinSearch;
use crate::special_join::{JoinKind, SpecialJoinInfo};
use tracing::trace;

/// Input child relations forming one slot of a partitioned join.
pub type PartPair = (Option<RelHandle>, Option<RelHandle>);

/// Does a join segment produce no rows, given which of its inputs are empty?
pub fn segment_is_empty(kind: JoinKind, left_empty: bool, right_empty: bool) -> bool {
    match kind {
        JoinKind::Inner | JoinKind::Semi => left_empty || right_empty,
        JoinKind::Left | JoinKind::Anti => left_empty,
        JoinKind::Full => left_empty && right_empty,
    }
}

impl JoinSearch {
    /// Build child joins between matching partitions of `rel1` and `rel2` and add
    /// paths to them. Does nothing unless `joinrel` and both inputs are partitioned
    /// under the same scheme.
    pub(crate) fn try_partitionwise_join(
        &mut self,
        rel1: RelHandle,
        rel2: RelHandle,
        joinrel: RelHandle,
        parent_sjinfo: &SpecialJoinInfo,
        parent_restrictions: &[RestrictInfo],
        depth: usize,
    ) -> Result<()> {
        if !self.can_decompose(rel1, rel2, joinrel) {
            return Ok(());
        }

        if depth > self.config.max_partition_depth {
            return Err(JoinSearchError::StackDepthExceeded {
                depth,
                limit: self.config.max_partition_depth,
                relids: self.store.get(joinrel).relids.to_string(),
            });
        }

        let Some(pairs) = self.compute_partition_bounds(rel1, rel2, joinrel, parent_sjinfo.kind) else {
            trace!(
                "join relation {} cannot be partition-aligned, joining unpartitioned",
                self.store.get(joinrel).relids
            );
            return Ok(());
        };

        let rel1_is_simple = self.store.get(rel1).kind.is_simple();
        let rel2_is_simple = self.store.get(rel2).kind.is_simple();

        for (slot, (child1, child2)) in pairs.into_iter().enumerate() {
            let rel1_empty = child1.map_or(true, |h| self.store.get(h).is_dummy);
            let rel2_empty = child2.map_or(true, |h| self.store.get(h).is_dummy);
            if segment_is_empty(parent_sjinfo.kind, rel1_empty, rel2_empty) {
                trace!("partition slot {} of {} is empty, skipped", slot, self.store.get(joinrel).relids);
                continue;
            }

            let (Some(child1), Some(child2)) = (child1, child2) else {
                self.mark_unpartitioned(joinrel, "pruned partition on a required side");
                return Ok(());
            };

            // Simple children that opted out are dummies without join support.
            if (rel1_is_simple && !self.store.get(child1).consider_partitionwise)
                || (rel2_is_simple && !self.store.get(child2).consider_partitionwise)
            {
                self.mark_unpartitioned(joinrel, "partition not eligible for partitionwise join");
                return Ok(());
            }

            let child1_relids = self.store.get(child1).relids.clone();
            let child2_relids = self.store.get(child2).relids.clone();
            let child_joinrelids = child1_relids.union(&child2_relids);

            let child_sjinfo =
                self.translator
                    .translate_special_join(parent_sjinfo, &child1_relids, &child2_relids);
            let child_restrictions = self
                .translator
                .translate_restrictions(parent_restrictions, &child_joinrelids);

            let existing = self
                .store
                .get(joinrel)
                .partition
                .as_ref()
                .and_then(|p| p.parts.get(slot).copied().flatten());
            let child_joinrel = match existing {
                Some(handle) => handle,
                None => {
                    let handle =
                        self.build_child_join_rel(child1, child2, &child_sjinfo, &child_restrictions);
                    if let Some(part) = self.store.get_mut(joinrel).partition.as_mut() {
                        if let Some(entry) = part.parts.get_mut(slot) {
                            *entry = Some(handle);
                        }
                        if !part.live_parts.contains(&slot) {
                            part.live_parts.push(slot);
                        }
                        part.all_partrels = part.all_partrels.union(&child_joinrelids);
                    }
                    handle
                }
            };

            self.populate_join_rel(
                child1,
                child2,
                child_joinrel,
                &child_sjinfo,
                &child_restrictions,
                depth + 1,
            )?;
        }
        Ok(())
    }

    fn can_decompose(&self, rel1: RelHandle, rel2: RelHandle, joinrel: RelHandle) -> bool {
        let jr = self.store.get(joinrel);
        let Some(part) = jr.partition.as_ref() else {
            return false;
        };
        if jr.is_dummy || part.nparts == Some(0) || !jr.consider_partitionwise {
            return false;
        }
        let (r1, r2) = (self.store.get(rel1), self.store.get(rel2));
        r1.is_partitioned()
            && r2.is_partitioned()
            && r1.scheme() == Some(part.scheme)
            && r2.scheme() == Some(part.scheme)
    }

    /// Resolve the join relation's bounds if needed and return the input pair for
    /// every slot; `None` means the join relation is (now) unpartitioned.
    fn compute_partition_bounds(
        &mut self,
        rel1: RelHandle,
        rel2: RelHandle,
        joinrel: RelHandle,
        kind: JoinKind,
    ) -> Option<Vec<PartPair>> {
        let part = self.store.get(joinrel).partition.as_ref()?;
        match part.nparts {
            Some(0) => None,
            Some(_) if part.merged => Some(self.get_matching_part_pairs(joinrel, rel1, rel2)),
            Some(nparts) => {
                let (r1, r2) = (self.store.get(rel1), self.store.get(rel2));
                Some(positional_pairs(r1, r2, nparts))
            }
            None => {
                let scheme = part.scheme;
                let (r1, r2) = (self.store.get(rel1), self.store.get(rel2));
                let (p1, p2) = (r1.partition.as_ref()?, r2.partition.as_ref()?);

                if !p1.merged && !p2.merged && p1.nparts == p2.nparts && p1.bounds == p2.bounds {
                    let nparts = p1.nparts.unwrap_or(0);
                    let bounds = p1.bounds.clone();
                    let pairs = positional_pairs(r1, r2, nparts);
                    let jp = self.store.get_mut(joinrel).partition.as_mut()?;
                    jp.nparts = Some(nparts);
                    jp.bounds = bounds;
                    jp.parts = vec![None; nparts];
                    return Some(pairs);
                }

                match self.bound_merger.merge(scheme, r1, r2, kind) {
                    Some(merged) if !merged.pairs.is_empty() => {
                        let nparts = merged.pairs.len();
                        let jp = self.store.get_mut(joinrel).partition.as_mut()?;
                        jp.nparts = Some(nparts);
                        jp.bounds = Some(merged.bounds);
                        jp.parts = vec![None; nparts];
                        jp.merged = true;
                        Some(merged.pairs)
                    }
                    _ => {
                        self.mark_unpartitioned(joinrel, "partition bounds could not be merged");
                        None
                    }
                }
            }
        }
    }

    /// Recover the input pairs of a merged join relation from its child joins: each
    /// child's relids split into the parts coming from either input. Slots without a
    /// child join yield an empty pair, so they are skipped again.
    pub(crate) fn get_matching_part_pairs(
        &self,
        joinrel: RelHandle,
        rel1: RelHandle,
        rel2: RelHandle,
    ) -> Vec<PartPair> {
        let Some(part) = self.store.get(joinrel).partition.as_ref() else {
            return Vec::new();
        };
        let all1 = partrels(self.store.get(rel1));
        let all2 = partrels(self.store.get(rel2));

        (0..part.nparts.unwrap_or(0))
            .map(|slot| match part.parts.get(slot).copied().flatten() {
                None => (None, None),
                Some(child) => {
                    let relids = &self.store.get(child).relids;
                    (
                        self.store.find(&relids.intersect(&all1)),
                        self.store.find(&relids.intersect(&all2)),
                    )
                }
            })
            .collect()
    }

    fn mark_unpartitioned(&mut self, joinrel: RelHandle, reason: &str) {
        let rel = self.store.get_mut(joinrel);
        trace!("join relation {} marked unpartitioned: {}", rel.relids, reason);
        if let Some(part) = rel.partition.as_mut() {
            part.mark_unpartitioned();
        }
    }

    /// Add append paths over the live child joins of `handle`, recursing into nested
    /// partitioned children first. A partitioned join whose children are all empty
    /// is itself empty.
    pub(crate) fn generate_partitionwise_join_paths(&mut self, handle: RelHandle) {
        let rel = self.store.get(handle);
        if !rel.is_partitioned() {
            return;
        }
        let children: Vec<RelHandle> = match rel.partition.as_ref() {
            Some(part) => part
                .live_parts
                .iter()
                .filter_map(|&slot| part.parts.get(slot).copied().flatten())
                .collect(),
            None => return,
        };

        let mut live = Vec::with_capacity(children.len());
        for child in children {
            self.generate_partitionwise_join_paths(child);
            self.store.get_mut(child).set_cheapest();
            if !self.store.get(child).is_dummy {
                live.push(child);
            }
        }

        if live.is_empty() {
            trace!("all child joins of {} are empty", self.store.get(handle).relids);
            self.store.get_mut(handle).mark_dummy();
            return;
        }

        let child_rels: Vec<&JoinRelation> = live.iter().map(|&h| self.store.get(h)).collect();
        let paths = self.paths.append_paths(self.store.get(handle), &child_rels);
        let rel = self.store.get_mut(handle);
        for path in paths {
            rel.add_path(path);
        }
    }
}

fn positional_pairs(r1: &JoinRelation, r2: &JoinRelation, nparts: usize) -> Vec<PartPair> {
    let slot = |rel: &JoinRelation, i: usize| {
        rel.partition
            .as_ref()
            .and_then(|p| p.parts.get(i).copied().flatten())
    };
    (0..nparts).map(|i| (slot(r1, i), slot(r2, i))).collect()
}

fn partrels(rel: &JoinRelation) -> RelIds {
    rel.partition
        .as_ref()
        .map(|p| p.all_partrels.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_skip_rules() {
        for kind in [JoinKind::Inner, JoinKind::Semi] {
            assert!(segment_is_empty(kind, true, false));
            assert!(segment_is_empty(kind, false, true));
            assert!(!segment_is_empty(kind, false, false));
        }
        for kind in [JoinKind::Left, JoinKind::Anti] {
            assert!(segment_is_empty(kind, true, false));
            assert!(!segment_is_empty(kind, false, true));
        }
        assert!(!segment_is_empty(JoinKind::Full, true, false));
        assert!(!segment_is_empty(JoinKind::Full, false, true));
        assert!(segment_is_empty(JoinKind::Full, true, true));
    }
}
