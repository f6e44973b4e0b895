//! # Join-Problem Wire Protocol
//!
//! The JSON shape of `POST /join-search` and its mapping onto the core's seeded
//! relation store. Relations and partitions are referenced by name on the wire;
//! relids are assigned here, top-level relations first (1, 2, ...) in request order,
//! then partitions in depth-first order.
//!
//! ```json
//! {
//!   "relations": [
//!     { "name": "orders", "rows": 1000,
//!       "partitions": { "scheme": 1, "parts": [
//!         { "name": "orders_p1", "rows": 400, "values": [1, 2] },
//!         null ] } },
//!     { "name": "customer", "rows": 100 }
//!   ],
//!   "clauses": [ { "label": "orders.cid = customer.id", "relations": ["orders", "customer"],
//!                  "equality": true } ],
//!   "specialJoins": [ { "kind": "left", "left": ["customer"], "right": ["orders"] } ],
//!   "leading": ["customer", "orders"]
//! }
//! ```
//!
//! A `null` partition slot is a pruned partition. A leading entry is either a name or
//! a list: two members join as (outer, inner), longer lists are left-deep.

use joinx_core::config::SearchConfig;
use joinx_core::cost::Cost;
use joinx_core::partition::{
    BoundValue, PartitionBounds, PartitionInfo, PartitionSchemeId, PartitionStrategy,
};
use joinx_core::relation::{JoinRelation, Path, RelHandle, RelKind, RelStore};
use joinx_core::relids::RelIds;
use joinx_core::restrict::RestrictInfo;
use joinx_core::special_join::{JoinConstraints, JoinKind, SpecialJoinInfo};
use joinx_core::translate::{AppendRelInfo, AppendRelMap};
use joinx_paths::cost::JoinCostModel;
use joinx_paths::leading::{LeadingHints, LeadingOrder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request body for `POST /join-search`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinProblemRequest {
    pub relations: Vec<RelationSpec>,
    #[serde(default)]
    pub clauses: Vec<ClauseSpec>,
    #[serde(default)]
    pub special_joins: Vec<SpecialJoinSpec>,
    /// Relation sets at which placeholder expressions must be evaluated.
    #[serde(default)]
    pub placeholders: Vec<Vec<String>>,
    #[serde(default)]
    pub leading: Option<LeadingSpec>,
    /// Overrides of the server's search configuration.
    #[serde(default)]
    pub config: Option<SearchConfig>,
    /// Overrides of the server's cost model.
    #[serde(default)]
    pub cost_model: Option<JoinCostModel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSpec {
    pub name: String,
    pub rows: f64,
    /// Relations this one references laterally.
    #[serde(default)]
    pub lateral: Vec<String>,
    #[serde(default)]
    pub partitions: Option<PartitionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionSpec {
    pub scheme: PartitionSchemeId,
    #[serde(default = "default_strategy")]
    pub strategy: PartitionStrategy,
    pub parts: Vec<Option<PartitionChildSpec>>,
}

fn default_strategy() -> PartitionStrategy {
    PartitionStrategy::List
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionChildSpec {
    pub name: String,
    pub rows: f64,
    /// Bound datums of this partition (accepted values for list partitioning).
    #[serde(default)]
    pub values: Vec<BoundValue>,
    /// Proven to hold no rows.
    #[serde(default)]
    pub empty: bool,
    /// Sub-partitions of this partition.
    #[serde(default)]
    pub partitions: Option<PartitionSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseSpec {
    pub label: String,
    pub relations: Vec<String>,
    #[serde(default)]
    pub pushed_down: bool,
    /// The clause equates an expression of each side, so it can key hash and merge joins.
    #[serde(default)]
    pub equality: bool,
    #[serde(default)]
    pub constant: Option<ClauseConstant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClauseConstant {
    True,
    False,
    Null,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialJoinSpec {
    pub kind: JoinKind,
    pub left: Vec<String>,
    pub right: Vec<String>,
    /// The join clause is strict for the left-hand relations.
    #[serde(default)]
    pub lhs_strict: bool,
}

/// Leading directive over relation names.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LeadingSpec {
    Rel(String),
    Join(Vec<LeadingSpec>),
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSearchResponse {
    pub tree: JoinTreeNode,
    pub cost: f64,
    /// Relations listed per level after pruning, starting at level 1.
    pub level_sizes: Vec<usize>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JoinTreeNode {
    Leaf {
        relation: String,
        path: String,
        cost: f64,
    },
    Join {
        path: String,
        #[serde(rename = "joinType")]
        join_type: String,
        cost: f64,
        outer: Box<JoinTreeNode>,
        inner: Box<JoinTreeNode>,
    },
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum ProblemError {
    #[error("join problem has no relations")]
    NoRelations,
    #[error("relation name {0:?} is used more than once")]
    DuplicateName(String),
    #[error("unknown relation {0:?}")]
    UnknownRelation(String),
    #[error("special join {index} must be left, full, semi or anti, not inner")]
    InnerSpecialJoin { index: usize },
    #[error("special join {index} has an empty side")]
    EmptySide { index: usize },
    #[error("relation {0:?} has a row count that is negative or not finite")]
    InvalidRows(String),
    #[error("invalid leading directive: {0}")]
    InvalidLeading(String),
}

/// A request mapped onto core inputs, ready to search.
pub struct SeededProblem {
    pub store: RelStore,
    pub constraints: JoinConstraints,
    pub appinfos: AppendRelMap,
    pub initial: Vec<RelHandle>,
    pub leading: LeadingHints,
}

struct Seeder<'a> {
    model: &'a JoinCostModel,
    store: RelStore,
    appinfos: AppendRelMap,
    names: HashSet<String>,
    next_relid: usize,
}

impl JoinProblemRequest {
    pub fn seed(&self, model: &JoinCostModel) -> Result<SeededProblem, ProblemError> {
        if self.relations.is_empty() {
            return Err(ProblemError::NoRelations);
        }

        let mut ids = HashMap::new();
        for (i, rel) in self.relations.iter().enumerate() {
            if ids.insert(rel.name.clone(), i + 1).is_some() {
                return Err(ProblemError::DuplicateName(rel.name.clone()));
            }
        }
        let resolve = |names: &[String]| -> Result<RelIds, ProblemError> {
            names
                .iter()
                .map(|n| ids.get(n).copied().ok_or_else(|| ProblemError::UnknownRelation(n.clone())))
                .collect()
        };

        let mut seeder = Seeder {
            model,
            store: RelStore::new(),
            appinfos: AppendRelMap::new(),
            names: ids.keys().cloned().collect(),
            next_relid: self.relations.len() + 1,
        };

        let mut initial = Vec::with_capacity(self.relations.len());
        for (i, spec) in self.relations.iter().enumerate() {
            let relid = i + 1;
            let mut rel = seeder.relation(RelKind::Base, relid, &spec.name, spec.rows, false)?;
            rel = rel.with_lateral(resolve(&spec.lateral)?);
            if let Some(partitions) = &spec.partitions {
                seeder.partition(&mut rel, relid, partitions)?;
            }
            initial.push(seeder.store.insert(rel));
        }

        let mut constraints = JoinConstraints::new();
        for clause in &self.clauses {
            let mut rinfo = RestrictInfo::new(clause.label.clone(), resolve(&clause.relations)?);
            rinfo.is_pushed_down = clause.pushed_down;
            rinfo.is_equality = clause.equality;
            rinfo.constant = clause.constant.map(|c| match c {
                ClauseConstant::True => Some(true),
                ClauseConstant::False => Some(false),
                ClauseConstant::Null => None,
            });
            constraints.add_join_clause(rinfo);
        }
        for (index, sj) in self.special_joins.iter().enumerate() {
            if sj.kind == JoinKind::Inner {
                return Err(ProblemError::InnerSpecialJoin { index });
            }
            let (left, right) = (resolve(&sj.left)?, resolve(&sj.right)?);
            if left.is_empty() || right.is_empty() {
                return Err(ProblemError::EmptySide { index });
            }
            let mut sjinfo = SpecialJoinInfo::new(sj.kind, left, right);
            if sj.lhs_strict {
                sjinfo = sjinfo.strict();
            }
            constraints.add_special_join(sjinfo);
        }
        for eval_at in &self.placeholders {
            constraints.add_placeholder(resolve(eval_at)?);
        }

        let leading = match &self.leading {
            None => LeadingHints::none(),
            Some(spec) => LeadingHints::new(&spec.to_order(&|n: &str| ids.get(n).copied())?),
        };

        Ok(SeededProblem {
            store: seeder.store,
            constraints,
            appinfos: seeder.appinfos,
            initial,
            leading,
        })
    }
}

impl Seeder<'_> {
    fn relation(
        &self,
        kind: RelKind,
        relid: usize,
        name: &str,
        rows: f64,
        empty: bool,
    ) -> Result<JoinRelation, ProblemError> {
        if !rows.is_finite() || rows < 0.0 {
            return Err(ProblemError::InvalidRows(name.to_string()));
        }
        let mut rel = JoinRelation::new(kind, RelIds::singleton(relid), name);
        rel.rows = rows;
        rel.add_path(Path::scan(Cost::new(self.model.cpu_weight * rows), rows));
        rel.set_cheapest();
        if empty {
            rel.mark_dummy();
        }
        Ok(rel)
    }

    /// Create the partitions of `parent` (relid `parent_relid`) and attach its
    /// partition metadata.
    fn partition(
        &mut self,
        parent: &mut JoinRelation,
        parent_relid: usize,
        spec: &PartitionSpec,
    ) -> Result<(), ProblemError> {
        let mut parts = Vec::with_capacity(spec.parts.len());
        let mut datums = Vec::with_capacity(spec.parts.len());
        let mut all_partrels = RelIds::empty();

        for slot in &spec.parts {
            let Some(child) = slot else {
                parts.push(None);
                datums.push(Vec::new());
                continue;
            };
            if !self.names.insert(child.name.clone()) {
                return Err(ProblemError::DuplicateName(child.name.clone()));
            }
            let relid = self.next_relid;
            self.next_relid += 1;

            let mut rel = self.relation(RelKind::OtherMember, relid, &child.name, child.rows, child.empty)?;
            rel.consider_partitionwise = true;
            if let Some(sub) = &child.partitions {
                self.partition(&mut rel, relid, sub)?;
            }
            self.appinfos.add(AppendRelInfo {
                parent_relid,
                child_relid: relid,
                parent_name: parent.name.clone(),
                child_name: child.name.clone(),
            });
            all_partrels = all_partrels.with(relid);
            datums.push(child.values.clone());
            parts.push(Some(self.store.insert(rel)));
        }

        let bounds = PartitionBounds {
            strategy: spec.strategy,
            datums,
        };
        parent.consider_partitionwise = true;
        parent.partition = Some(PartitionInfo::for_base(spec.scheme, bounds, parts, all_partrels));
        Ok(())
    }
}

impl LeadingSpec {
    fn to_order(&self, lookup: &dyn Fn(&str) -> Option<usize>) -> Result<LeadingOrder, ProblemError> {
        match self {
            LeadingSpec::Rel(name) => lookup(name)
                .map(LeadingOrder::Rel)
                .ok_or_else(|| ProblemError::UnknownRelation(name.clone())),
            LeadingSpec::Join(items) => {
                if items.len() < 2 {
                    return Err(ProblemError::InvalidLeading(format!(
                        "a group needs at least two members, got {}",
                        items.len()
                    )));
                }
                let mut order = items[0].to_order(lookup)?;
                for item in &items[1..] {
                    order = LeadingOrder::join(order, item.to_order(lookup)?);
                }
                Ok(order)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> JoinProblemRequest {
        serde_json::from_str(json).unwrap()
    }

    fn seed(json: &str) -> Result<SeededProblem, ProblemError> {
        parse(json).seed(&JoinCostModel::default())
    }

    fn set(ids: &[usize]) -> RelIds {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_relids_assigned_in_order() {
        let problem = seed(
            r#"{
                "relations": [
                    {"name": "a", "rows": 10},
                    {"name": "b", "rows": 20, "lateral": ["a"]}
                ],
                "clauses": [{"label": "a.x = b.x", "relations": ["a", "b"], "equality": true}],
                "specialJoins": [{"kind": "left", "left": ["a"], "right": ["b"], "lhsStrict": true}],
                "placeholders": [["a", "b"]]
            }"#,
        )
        .unwrap();

        assert_eq!(problem.initial.len(), 2);
        let b = problem.store.get(problem.initial[1]);
        assert_eq!(b.relids, set(&[2]));
        assert_eq!(b.lateral_relids, set(&[1]));
        assert_eq!(problem.constraints.join_clauses[0].required_relids, set(&[1, 2]));
        assert!(problem.constraints.join_clauses[0].is_equality);
        let sj = &problem.constraints.special_joins[0];
        assert_eq!(sj.kind, JoinKind::Left);
        assert!(sj.lhs_strict);
        assert_eq!(problem.constraints.placeholders[0].eval_at, set(&[1, 2]));
        assert!(problem.leading.pairs().is_empty());
    }

    #[test]
    fn test_partitions_and_pruned_slots() {
        let problem = seed(
            r#"{
                "relations": [
                    {"name": "p", "rows": 300, "partitions": {"scheme": 3, "parts": [
                        {"name": "p_1", "rows": 100, "values": [1]},
                        null,
                        {"name": "p_3", "rows": 100, "values": [3], "empty": true}
                    ]}},
                    {"name": "q", "rows": 50}
                ]
            }"#,
        )
        .unwrap();

        let p = problem.store.get(problem.initial[0]);
        let info = p.partition.as_ref().unwrap();
        assert_eq!(info.scheme, 3);
        assert_eq!(info.live_parts, vec![0, 2]);
        assert_eq!(info.all_partrels, set(&[3, 4]));
        assert!(p.consider_partitionwise);

        let third = problem.store.get(info.parts[2].unwrap());
        assert!(third.is_dummy);
        assert_eq!(third.kind, RelKind::OtherMember);
        assert!(!problem.appinfos.is_empty());
        // partitions are not level-1 relations
        assert_eq!(problem.store.get(problem.initial[1]).relids, set(&[2]));
    }

    #[test]
    fn test_clause_constants() {
        let problem = seed(
            r#"{
                "relations": [{"name": "a", "rows": 1}, {"name": "b", "rows": 1}],
                "clauses": [
                    {"label": "false", "relations": ["a", "b"], "constant": "false", "pushedDown": true},
                    {"label": "null", "relations": ["a"], "constant": "null"}
                ]
            }"#,
        )
        .unwrap();
        let clauses = &problem.constraints.join_clauses;
        assert_eq!(clauses[0].constant, Some(Some(false)));
        assert!(clauses[0].is_pushed_down);
        assert_eq!(clauses[1].constant, Some(None));
        assert!(!clauses[0].is_equality);
    }

    #[test]
    fn test_leading_groups() {
        let problem = seed(
            r#"{
                "relations": [{"name": "a", "rows": 1}, {"name": "b", "rows": 1},
                              {"name": "c", "rows": 1}, {"name": "d", "rows": 1}],
                "leading": [["a", "b"], ["c", "d"]]
            }"#,
        )
        .unwrap();
        assert_eq!(problem.leading.pairs().len(), 3);
        assert_eq!(problem.leading.pairs()[2], (set(&[1, 2]), set(&[3, 4])));

        let flat = seed(
            r#"{
                "relations": [{"name": "a", "rows": 1}, {"name": "b", "rows": 1}, {"name": "c", "rows": 1}],
                "leading": ["c", "a", "b"]
            }"#,
        )
        .unwrap();
        assert_eq!(flat.leading.pairs(), &[(set(&[3]), set(&[1])), (set(&[1, 3]), set(&[2]))]);
    }

    #[test]
    fn test_rejects_malformed_problems() {
        assert_eq!(seed(r#"{"relations": []}"#).err(), Some(ProblemError::NoRelations));
        assert_eq!(
            seed(r#"{"relations": [{"name": "a", "rows": 1}, {"name": "a", "rows": 2}]}"#).err(),
            Some(ProblemError::DuplicateName("a".into()))
        );
        assert_eq!(
            seed(r#"{"relations": [{"name": "a", "rows": 1}],
                     "clauses": [{"label": "a.x = z.x", "relations": ["a", "z"]}]}"#)
            .err(),
            Some(ProblemError::UnknownRelation("z".into()))
        );
        assert_eq!(
            seed(r#"{"relations": [{"name": "a", "rows": 1}, {"name": "b", "rows": 1}],
                     "specialJoins": [{"kind": "inner", "left": ["a"], "right": ["b"]}]}"#)
            .err(),
            Some(ProblemError::InnerSpecialJoin { index: 0 })
        );
        assert!(matches!(
            seed(r#"{"relations": [{"name": "a", "rows": 1}], "leading": ["a"]}"#).err(),
            Some(ProblemError::InvalidLeading(_))
        ));
        assert_eq!(
            seed(r#"{"relations": [{"name": "a", "rows": -1}]}"#).err(),
            Some(ProblemError::InvalidRows("a".into()))
        );
    }

    #[test]
    fn test_non_finite_rows_rejected() {
        let model = JoinCostModel::default();
        let seeder = Seeder {
            model: &model,
            store: RelStore::new(),
            appinfos: AppendRelMap::new(),
            names: HashSet::new(),
            next_relid: 1,
        };
        for rows in [f64::NAN, f64::INFINITY, -0.5] {
            let err = seeder.relation(RelKind::Base, 1, "t", rows, false).err();
            assert_eq!(err, Some(ProblemError::InvalidRows("t".into())), "rows={}", rows);
        }
        assert!(seeder.relation(RelKind::Base, 1, "t", 0.0, false).is_ok());
    }
}
