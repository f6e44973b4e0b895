//! # Join Cost Model
//!
//! Local costs of the join strategies the default path builder proposes. A path's
//! total cost is its local cost plus the cheapest total costs of its inputs, so costs
//! accumulate bottom-up as the search climbs levels.
//!
//! ```text
//! local_cost = cpu_weight * rows_processed + memory_weight * bytes_held
//! ```
//!
//! | Strategy   | Rows processed                          | Bytes held             |
//! |------------|-----------------------------------------|------------------------|
//! | Nested loop| outer * inner                           | none                   |
//! | Hash join  | build (inner) + probe (outer)           | build rows * row width |
//! | Merge join | sort both inputs, then outer + inner    | none                   |
//! | Unique-ify | rows * log2(rows) (sort-based dedup)    | none                   |
//!
//! Every strategy also pays `cpu_weight` per output row.

use joinx_core::relation::PathKind;
use serde::{Deserialize, Serialize};

/// Weights and constants of the default cost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinCostModel {
    /// Weight per row processed.
    pub cpu_weight: f64,
    /// Weight per byte held in memory (hash tables).
    pub memory_weight: f64,
    /// Assumed average row width in bytes.
    pub row_width: f64,
    /// Default selectivity applied once per join clause.
    pub clause_selectivity: f64,
    /// Fraction of a relation's rows left after unique-ification.
    pub unique_fraction: f64,
}

impl Default for JoinCostModel {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            memory_weight: 0.01,
            row_width: 100.0,
            clause_selectivity: 0.1,
            unique_fraction: 0.5,
        }
    }
}

impl JoinCostModel {
    /// Local cost of running `kind` over inputs of the given sizes.
    pub fn join_cost(&self, kind: PathKind, outer_rows: f64, inner_rows: f64, out_rows: f64) -> f64 {
        let local = match kind {
            PathKind::NestLoop => self.cpu_weight * outer_rows * inner_rows,
            PathKind::HashJoin | PathKind::UniqueInner | PathKind::UniqueOuter => {
                self.cpu_weight * (inner_rows + outer_rows)
                    + self.memory_weight * inner_rows * self.row_width
            }
            PathKind::MergeJoin => {
                self.sort_cost(outer_rows) + self.sort_cost(inner_rows)
                    + self.cpu_weight * (outer_rows + inner_rows)
            }
            PathKind::Scan | PathKind::Unique | PathKind::Append | PathKind::Empty => 0.0,
        };
        local + self.cpu_weight * out_rows
    }

    /// Cost of de-duplicating `rows` rows.
    pub fn unique_cost(&self, rows: f64) -> f64 {
        self.sort_cost(rows)
    }

    /// Rows left after de-duplicating `rows` rows.
    pub fn unique_rows(&self, rows: f64) -> f64 {
        (rows * self.unique_fraction).max(1.0)
    }

    /// Cost of concatenating child results.
    pub fn append_cost(&self, rows: f64) -> f64 {
        self.cpu_weight * rows * 0.1
    }

    fn sort_cost(&self, rows: f64) -> f64 {
        let n_log_n = if rows > 1.0 { rows * rows.log2() } else { 1.0 };
        self.cpu_weight * n_log_n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_join_cheaper_with_small_build_side() {
        let model = JoinCostModel::default();
        let small_build = model.join_cost(PathKind::HashJoin, 1_000_000.0, 100.0, 1000.0);
        let large_build = model.join_cost(PathKind::HashJoin, 100.0, 1_000_000.0, 1000.0);
        assert!(small_build < large_build);
    }

    #[test]
    fn test_nested_loop_quadratic() {
        let model = JoinCostModel::default();
        let nl = model.join_cost(PathKind::NestLoop, 10_000.0, 10_000.0, 1.0);
        let hj = model.join_cost(PathKind::HashJoin, 10_000.0, 10_000.0, 1.0);
        assert!(hj < nl);
        // tiny inputs: nested loop wins
        let nl = model.join_cost(PathKind::NestLoop, 2.0, 2.0, 1.0);
        let hj = model.join_cost(PathKind::HashJoin, 2.0, 2.0, 1.0);
        assert!(nl < hj);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let model: JoinCostModel = serde_json::from_str(r#"{"cpu_weight": 2.0}"#).unwrap();
        assert_eq!(model.cpu_weight, 2.0);
        assert_eq!(model.clause_selectivity, JoinCostModel::default().clause_selectivity);
    }
}
