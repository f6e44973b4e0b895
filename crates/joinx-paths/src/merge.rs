//! # List-Partition Bound Merging
//!
//! Two list-partitioned inputs whose partitions accept different value sets can still
//! be joined partitionwise when every partition on one side shares values with at most
//! one partition on the other. Merging pairs those partitions up and computes the
//! value list of each merged slot:
//!
//! | Join kind    | Slots kept                              | Values per slot |
//! |--------------|-----------------------------------------|-----------------|
//! | Inner, Semi  | matched pairs                           | intersection    |
//! | Left, Anti   | matched pairs, unmatched left partitions| left values     |
//! | Full         | everything                              | union           |
//!
//! Merged slots are ordered by their smallest value. Range and hash bounds are not
//! merged; a partition overlapping two partitions on the other side defeats merging.

use joinx_core::partition::{
    BoundValue, MergedBounds, PartitionBoundMerger, PartitionBounds, PartitionSchemeId,
    PartitionStrategy,
};
use joinx_core::relation::{JoinRelation, RelHandle};
use joinx_core::special_join::JoinKind;
use std::collections::BTreeSet;
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
pub struct ListBoundMerger;

struct Slot {
    values: BTreeSet<BoundValue>,
    left: Option<RelHandle>,
    right: Option<RelHandle>,
}

fn list_parts(rel: &JoinRelation) -> Option<Vec<(BTreeSet<BoundValue>, Option<RelHandle>)>> {
    let part = rel.partition.as_ref()?;
    let bounds = part.bounds.as_ref()?;
    if bounds.strategy != PartitionStrategy::List {
        return None;
    }
    Some(
        bounds
            .datums
            .iter()
            .enumerate()
            .map(|(i, values)| {
                let handle = part.parts.get(i).copied().flatten();
                (values.iter().cloned().collect(), handle)
            })
            .collect(),
    )
}

/// For each partition on `from`, the single partition on `to` it shares values with.
/// `Err(())` if some partition overlaps more than one.
fn match_partitions(
    from: &[(BTreeSet<BoundValue>, Option<RelHandle>)],
    to: &[(BTreeSet<BoundValue>, Option<RelHandle>)],
) -> Result<Vec<Option<usize>>, ()> {
    from.iter()
        .map(|(values, _)| {
            let mut hits = to
                .iter()
                .enumerate()
                .filter(|(_, (other, _))| !values.is_disjoint(other))
                .map(|(j, _)| j);
            match (hits.next(), hits.next()) {
                (None, _) => Ok(None),
                (Some(j), None) => Ok(Some(j)),
                (Some(_), Some(_)) => Err(()),
            }
        })
        .collect()
}

impl PartitionBoundMerger for ListBoundMerger {
    fn merge(
        &self,
        _scheme: PartitionSchemeId,
        rel1: &JoinRelation,
        rel2: &JoinRelation,
        kind: JoinKind,
    ) -> Option<MergedBounds> {
        let (left, right) = (list_parts(rel1)?, list_parts(rel2)?);
        let (Ok(l2r), Ok(r2l)) = (match_partitions(&left, &right), match_partitions(&right, &left)) else {
            trace!("list bounds of {} and {} overlap ambiguously", rel1.relids, rel2.relids);
            return None;
        };

        let mut slots = Vec::new();
        for (i, (values, handle)) in left.iter().enumerate() {
            match l2r[i] {
                Some(j) => {
                    let (other, other_handle) = &right[j];
                    let merged = match kind {
                        JoinKind::Inner | JoinKind::Semi => values.intersection(other).cloned().collect(),
                        JoinKind::Left | JoinKind::Anti => values.clone(),
                        JoinKind::Full => values.union(other).cloned().collect(),
                    };
                    slots.push(Slot {
                        values: merged,
                        left: *handle,
                        right: *other_handle,
                    });
                }
                None => {
                    if matches!(kind, JoinKind::Left | JoinKind::Anti | JoinKind::Full) {
                        slots.push(Slot {
                            values: values.clone(),
                            left: *handle,
                            right: None,
                        });
                    }
                }
            }
        }
        if kind == JoinKind::Full {
            for (j, (values, handle)) in right.iter().enumerate() {
                if r2l[j].is_none() {
                    slots.push(Slot {
                        values: values.clone(),
                        left: None,
                        right: *handle,
                    });
                }
            }
        }

        slots.retain(|s| !s.values.is_empty());
        if slots.is_empty() {
            return None;
        }
        slots.sort_by(|a, b| a.values.first().cmp(&b.values.first()));

        let bounds = PartitionBounds {
            strategy: PartitionStrategy::List,
            datums: slots.iter().map(|s| s.values.iter().cloned().collect()).collect(),
        };
        let pairs = slots.into_iter().map(|s| (s.left, s.right)).collect();
        Some(MergedBounds { bounds, pairs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joinx_core::partition::PartitionInfo;
    use joinx_core::relation::RelKind;
    use joinx_core::relids::RelIds;

    fn list_rel(id: usize, values: &[&[i64]], first_child: usize) -> JoinRelation {
        let mut rel = JoinRelation::new(RelKind::Base, RelIds::singleton(id), format!("t{id}"));
        let parts: Vec<Option<RelHandle>> =
            (0..values.len()).map(|i| Some(RelHandle(first_child + i))).collect();
        let bounds = PartitionBounds {
            strategy: PartitionStrategy::List,
            datums: values
                .iter()
                .map(|vs| vs.iter().map(|&v| BoundValue::Int(v)).collect())
                .collect(),
        };
        rel.partition = Some(PartitionInfo::for_base(1, bounds, parts, RelIds::empty()));
        rel
    }

    fn datums(merged: &MergedBounds) -> Vec<Vec<BoundValue>> {
        merged.bounds.datums.clone()
    }

    #[test]
    fn test_inner_keeps_matched_intersections() {
        let a = list_rel(1, &[&[1, 2], &[3], &[5]], 10);
        let b = list_rel(2, &[&[2], &[3, 4]], 20);
        let merged = ListBoundMerger.merge(1, &a, &b, JoinKind::Inner).expect("mergeable");
        assert_eq!(
            datums(&merged),
            vec![vec![BoundValue::Int(2)], vec![BoundValue::Int(3)]]
        );
        assert_eq!(
            merged.pairs,
            vec![
                (Some(RelHandle(10)), Some(RelHandle(20))),
                (Some(RelHandle(11)), Some(RelHandle(21))),
            ]
        );
    }

    #[test]
    fn test_left_keeps_unmatched_left_partitions() {
        let a = list_rel(1, &[&[1, 2], &[5]], 10);
        let b = list_rel(2, &[&[2], &[7]], 20);
        let merged = ListBoundMerger.merge(1, &a, &b, JoinKind::Left).expect("mergeable");
        assert_eq!(
            merged.pairs,
            vec![(Some(RelHandle(10)), Some(RelHandle(20))), (Some(RelHandle(11)), None)]
        );
    }

    #[test]
    fn test_full_keeps_both_sides_ordered() {
        let a = list_rel(1, &[&[5]], 10);
        let b = list_rel(2, &[&[7], &[1]], 20);
        let merged = ListBoundMerger.merge(1, &a, &b, JoinKind::Full).expect("mergeable");
        assert_eq!(
            merged.pairs,
            vec![
                (None, Some(RelHandle(21))),
                (Some(RelHandle(10)), None),
                (None, Some(RelHandle(20))),
            ]
        );
    }

    #[test]
    fn test_ambiguous_overlap_fails() {
        let a = list_rel(1, &[&[1, 2, 3]], 10);
        let b = list_rel(2, &[&[1], &[3]], 20);
        assert!(ListBoundMerger.merge(1, &a, &b, JoinKind::Inner).is_none());
    }

    #[test]
    fn test_disjoint_inner_fails() {
        let a = list_rel(1, &[&[1]], 10);
        let b = list_rel(2, &[&[2]], 20);
        assert!(ListBoundMerger.merge(1, &a, &b, JoinKind::Inner).is_none());
    }
}
