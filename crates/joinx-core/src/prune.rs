//! # Hint-Aware Level Pruning
//!
//! With a leading directive, the cost model disables every join the directive rules
//! out by pricing it at or above the disable threshold. Such relations can never be
//! part of the final plan once the level also holds a hinted relation, so they are
//! dropped before the next level multiplies them.
//!
//! The pass only runs with a leading directive and only on levels that hold a hinted
//! relation. A level is never emptied.

use crate::hint::HintOracle;
use crate::relation::{JoinRelation, RelHandle, RelStore};
use tracing::trace;

/// Classification of one relation at a level, by its cheapest path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelEntry {
    /// The path joins a hinted pair, or sits on top of one.
    pub hinted: bool,
    /// Cheap enough to be enabled, or hinted regardless of cost.
    pub keep: bool,
}

impl LevelEntry {
    pub fn classify(rel: &JoinRelation, disable_cost: f64) -> Self {
        match rel.cheapest() {
            Some(path) => {
                let hinted = path.carries_hint();
                Self {
                    hinted,
                    keep: path.total_cost.total < disable_cost || hinted,
                }
            }
            // nothing to build the relation from
            None => Self {
                hinted: false,
                keep: false,
            },
        }
    }
}

/// The relations of `level` that survive pruning, in their original order.
pub fn prune_level(
    store: &RelStore,
    hints: &dyn HintOracle,
    level: usize,
    rels: &[RelHandle],
    disable_cost: f64,
) -> Vec<RelHandle> {
    if !hints.has_leading_hint() {
        return rels.to_vec();
    }

    let entries: Vec<LevelEntry> = rels
        .iter()
        .map(|&h| LevelEntry::classify(store.get(h), disable_cost))
        .collect();

    let any_hinted = entries.iter().any(|e| e.hinted);
    let any_dropped = entries.iter().any(|e| !e.keep);
    let any_kept = entries.iter().any(|e| e.keep);
    if !(any_hinted && any_dropped && any_kept) {
        return rels.to_vec();
    }

    let mut kept = Vec::with_capacity(rels.len());
    for (&handle, entry) in rels.iter().zip(&entries) {
        let rel = store.get(handle);
        if entry.keep {
            trace!("Level {} KEEP rel {} ({})", level, rel.relids, rel.name);
            kept.push(handle);
        } else {
            trace!("Level {} DROP rel {} ({})", level, rel.relids, rel.name);
        }
    }
    kept
}
