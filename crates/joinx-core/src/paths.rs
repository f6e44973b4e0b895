//! # Path Construction Capability
//!
//! The search decides *which* relation sets to build and with which join semantics;
//! attaching concrete execution strategies to them is delegated to a [`PathBuilder`].
//! The builder returns paths rather than mutating relations, so the core can hold
//! shared references to both inputs while it asks, then record the result itself.

use crate::relation::{JoinRelation, Path};
use crate::restrict::RestrictInfo;
use crate::special_join::{JoinKind, SpecialJoinInfo};

/// Whether one input of an inner join is de-duplicated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueSide {
    None,
    /// The inner input is unique-ified.
    Inner,
    /// The outer input is unique-ified.
    Outer,
}

/// What the core asks the builder to implement for one orientation of a join.
#[derive(Debug, Clone, Copy)]
pub struct JoinPathRequest<'a> {
    /// Join semantics of the paths to build.
    pub kind: JoinKind,
    /// The constraint being implemented (a plain inner stand-in for inner joins).
    pub sjinfo: &'a SpecialJoinInfo,
    /// Clauses evaluated at this join.
    pub restrictions: &'a [RestrictInfo],
    /// The outer input is the syntactic right-hand side of `kind`; for a left join this
    /// asks for right-join implementations with the nullable side driving.
    pub swapped: bool,
    pub unique: UniqueSide,
}

/// Cost-model collaborator: estimates sizes and proposes paths.
pub trait PathBuilder: Send + Sync {
    /// Estimated output rows of joining `rel1` with `rel2` under `sjinfo`.
    fn estimate_rows(
        &self,
        rel1: &JoinRelation,
        rel2: &JoinRelation,
        sjinfo: &SpecialJoinInfo,
        restrictions: &[RestrictInfo],
    ) -> f64;

    /// Paths joining `outer` to `inner` for `joinrel`, as described by `request`.
    fn join_paths(
        &self,
        joinrel: &JoinRelation,
        outer: &JoinRelation,
        inner: &JoinRelation,
        request: &JoinPathRequest<'_>,
    ) -> Vec<Path>;

    /// A path producing `rel` with duplicates removed with respect to the semi-join's
    /// right-hand expressions, or `None` if `rel` cannot be unique-ified.
    fn unique_path(&self, rel: &JoinRelation, sjinfo: &SpecialJoinInfo) -> Option<Path>;

    /// Append paths over the live child joins of a partitionwise-joined relation.
    fn append_paths(&self, joinrel: &JoinRelation, children: &[&JoinRelation]) -> Vec<Path>;

    /// Whether a join of two partitioned inputs may be decomposed partitionwise, e.g.
    /// because the restrictions equate the partition keys.
    fn partitionwise_eligible(
        &self,
        _rel1: &JoinRelation,
        _rel2: &JoinRelation,
        _sjinfo: &SpecialJoinInfo,
        _restrictions: &[RestrictInfo],
    ) -> bool {
        true
    }
}
