//! # Path Cost
//!
//! The join search compares implementation paths by a single comparable number.
//! How that number is computed belongs to the path collaborator (see
//! [`crate::paths::PathBuilder`]); the core only needs to order costs and compare them
//! against the configured disable threshold during hint-aware pruning.

use serde::{Deserialize, Serialize};

/// Estimated expense of a path. Lower is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost {
    /// The total weighted cost. `f64::MAX` represents an infeasible plan.
    pub total: f64,
}

impl Cost {
    pub fn zero() -> Self {
        Self { total: 0.0 }
    }

    pub fn new(total: f64) -> Self {
        Self { total }
    }

    pub fn infinite() -> Self {
        Self { total: f64::MAX }
    }

    pub fn is_infinite(&self) -> bool {
        self.total == f64::MAX
    }

    /// Saturating addition, so accumulating onto an infinite cost stays infinite.
    pub fn plus(&self, other: Cost) -> Cost {
        if self.is_infinite() || other.is_infinite() {
            return Cost::infinite();
        }
        Cost::new(self.total + other.total)
    }
}

/// Epsilon-based equality to handle floating-point imprecision in cost comparisons.
impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        (self.total - other.total).abs() < f64::EPSILON
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.total.partial_cmp(&other.total)
    }
}
