//! # joinx-paths
//!
//! Ready-made collaborators for the `joinx-core` join search:
//!
//! - [`builder::DefaultPathBuilder`]: nested-loop, hash and merge paths priced by a
//!   configurable [`cost::JoinCostModel`]
//! - [`leading::LeadingHints`]: a leading join-order directive as a hint oracle
//! - [`merge::ListBoundMerger`]: partition-bound merging for list-partitioned inputs

pub mod builder;
pub mod cost;
pub mod leading;
pub mod merge;
