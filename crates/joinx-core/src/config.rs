use serde::{Deserialize, Serialize};

/// Configuration knobs for one join search run.
///
/// Every field has a default, so a partial JSON object is enough to override a single
/// knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Cost at or above which a path is treated as disabled. Level pruning drops
    /// unhinted relations whose cheapest path reaches this threshold.
    pub disable_cost: f64,
    /// Maximum nesting of partitionwise decomposition before the run fails fast.
    pub max_partition_depth: usize,
    /// Consider executing joins of partitioned inputs partition by partition.
    pub enable_partitionwise_join: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            disable_cost: 1.0e10,
            max_partition_depth: 64,
            enable_partitionwise_join: true,
        }
    }
}
