//! # Hint Oracle
//!
//! Explicit join-order directives (a "leading" hint) influence the search in two
//! places: the driver also tries pairs a directive names even when no join clause
//! links them, and the level pruning pass may discard unhinted relations once a level
//! contains a hinted one. Both only ask yes/no questions, so the directives sit behind
//! this capability and the core never parses or stores them.

use crate::relids::RelIds;

/// Answers questions about explicit join-order directives.
pub trait HintOracle: Send + Sync {
    /// True if the query carries a join-order (leading) directive at all. Level pruning
    /// never runs otherwise.
    fn has_leading_hint(&self) -> bool;

    /// Is joining `outer` with `inner` named by a directive? With `inner == None`,
    /// asks whether `outer` is one side of any directive. With `try_swapped`, the
    /// mirrored pair also counts.
    fn is_hinted(&self, outer: &RelIds, inner: Option<&RelIds>, try_swapped: bool) -> bool;
}

/// Oracle for queries without directives: pure cost-based search.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHints;

impl HintOracle for NoHints {
    fn has_leading_hint(&self) -> bool {
        false
    }

    fn is_hinted(&self, _outer: &RelIds, _inner: Option<&RelIds>, _try_swapped: bool) -> bool {
        false
    }
}
