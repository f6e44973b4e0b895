//! Fatal outcomes of a join search.
//!
//! Partitionwise fallbacks and illegal pairs are ordinary results, not errors: only
//! conditions that point at inconsistent input or broken constraint bookkeeping end
//! the run.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JoinSearchError {
    /// No relation could be formed at a level and no special join or lateral
    /// reference explains it.
    #[error("failed to build any {level}-way joins")]
    NoJoinsAtLevel { level: usize },

    #[error("failed to build a single {level}-way join: {count} relations remain ({relids})")]
    FinalLevelNotConverged {
        level: usize,
        count: usize,
        relids: String,
    },

    #[error("partitionwise join nesting depth {depth} exceeds limit {limit} at {relids}")]
    StackDepthExceeded {
        depth: usize,
        limit: usize,
        relids: String,
    },

    #[error("invalid join search input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, JoinSearchError>;
