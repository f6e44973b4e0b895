//! # joinx-core: Join-Order Enumeration Core
//!
//! This crate implements the join-order search of a cost-based query optimizer: given
//! the base relations of a query's join tree, it enumerates every legal way of
//! combining them pairwise, level by level, and hands each candidate join to a
//! path-construction collaborator.
//!
//! ## Module Overview
//!
//! - **`relids`**: Relation-id sets, the substrate for every legality and dedup check.
//! - **`relation`**: Join relations, their paths, and the per-run relation store.
//! - **`special_join`**: Outer/semi/anti join constraints, placeholders, join clauses.
//! - **`restrict`**: Restriction clauses and constant-false detection.
//! - **`legality`**: Whether a pair may be joined, and with which join kind.
//! - **`search`**: The level-by-level dynamic-programming driver.
//! - **`prune`**: Hint-aware pruning of disabled relations after each level.
//! - **`partitionwise`**: Decomposition of partitioned joins into per-partition joins.
//! - **`partition`**: Partition schemes, bounds, and the bound-merge capability.
//! - **`translate`**: Parent-to-partition translation of join structures.
//! - **`paths`**: The `PathBuilder` capability that proposes paths.
//! - **`hint`**: The `HintOracle` capability for join-order directives.
//! - **`cost`**, **`config`**, **`error`**: Cost values, search knobs, fatal errors.

pub mod config;
pub mod cost;
pub mod error;
pub mod hint;
pub mod legality;
pub mod partition;
pub mod partitionwise;
pub mod paths;
pub mod prune;
pub mod relation;
pub mod relids;
pub mod restrict;
pub mod search;
pub mod special_join;
pub mod translate;
