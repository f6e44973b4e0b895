//! # Append-Relation Translation
//!
//! A child join between partitions needs the parent join's structures restated in
//! terms of the partitions: wherever the parent's special-join sides or clauses name a
//! partitioned parent relation, the child versions name the matching partition
//! instead. The [`AppendRelTranslator`] capability does that rewriting;
//! [`AppendRelMap`] implements it from a list of parent/child pairs.

use crate::relids::RelIds;
use crate::restrict::RestrictInfo;
use crate::special_join::SpecialJoinInfo;

/// Link from a partitioned parent relation to one of its partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendRelInfo {
    pub parent_relid: usize,
    pub child_relid: usize,
    pub parent_name: String,
    pub child_name: String,
}

/// Rewrites parent-relation references into child-relation references.
pub trait AppendRelTranslator: Send + Sync {
    /// Replace every parent whose child is in `child_relids` by that child.
    fn translate_relids(&self, relids: &RelIds, child_relids: &RelIds) -> RelIds;

    fn translate_restrictions(
        &self,
        restrictions: &[RestrictInfo],
        child_relids: &RelIds,
    ) -> Vec<RestrictInfo>;

    /// Child-join version of `parent`; left sides are translated with the left child's
    /// relids, right sides with the right child's.
    fn translate_special_join(
        &self,
        parent: &SpecialJoinInfo,
        left_relids: &RelIds,
        right_relids: &RelIds,
    ) -> SpecialJoinInfo {
        SpecialJoinInfo {
            min_lefthand: self.translate_relids(&parent.min_lefthand, left_relids),
            min_righthand: self.translate_relids(&parent.min_righthand, right_relids),
            syn_lefthand: self.translate_relids(&parent.syn_lefthand, left_relids),
            syn_righthand: self.translate_relids(&parent.syn_righthand, right_relids),
            kind: parent.kind,
            lhs_strict: parent.lhs_strict,
        }
    }
}

/// Translator backed by the full list of parent/child links of the query.
#[derive(Debug, Clone, Default)]
pub struct AppendRelMap {
    appinfos: Vec<AppendRelInfo>,
}

impl AppendRelMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, appinfo: AppendRelInfo) {
        self.appinfos.push(appinfo);
    }

    pub fn is_empty(&self) -> bool {
        self.appinfos.is_empty()
    }

    fn find_by_child<'a>(&'a self, child_relids: &'a RelIds) -> impl Iterator<Item = &'a AppendRelInfo> {
        self.appinfos
            .iter()
            .filter(move |a| child_relids.contains(a.child_relid))
    }
}

impl AppendRelTranslator for AppendRelMap {
    fn translate_relids(&self, relids: &RelIds, child_relids: &RelIds) -> RelIds {
        let mut out = relids.clone();
        for appinfo in self.find_by_child(child_relids) {
            if out.contains(appinfo.parent_relid) {
                out = out
                    .difference(&RelIds::singleton(appinfo.parent_relid))
                    .with(appinfo.child_relid);
            }
        }
        out
    }

    fn translate_restrictions(
        &self,
        restrictions: &[RestrictInfo],
        child_relids: &RelIds,
    ) -> Vec<RestrictInfo> {
        restrictions
            .iter()
            .map(|rinfo| {
                let mut label = rinfo.label.clone();
                for appinfo in self.find_by_child(child_relids) {
                    if rinfo.required_relids.contains(appinfo.parent_relid) {
                        label = requalify(&label, &appinfo.parent_name, &appinfo.child_name);
                    }
                }
                RestrictInfo {
                    label,
                    required_relids: self.translate_relids(&rinfo.required_relids, child_relids),
                    ..rinfo.clone()
                }
            })
            .collect()
    }
}

/// Replace the `from.` qualifier by `to.` wherever it starts an identifier, so
/// `ba.x` stays untouched when requalifying `a`.
fn requalify(label: &str, from: &str, to: &str) -> String {
    let needle = format!("{}.", from);
    let mut out = String::with_capacity(label.len());
    let mut copied = 0;
    for (at, _) in label.match_indices(&needle) {
        let starts_ident = label[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        if starts_ident {
            out.push_str(&label[copied..at]);
            out.push_str(to);
            out.push('.');
            copied = at + needle.len();
        }
    }
    out.push_str(&label[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::special_join::JoinKind;

    fn set(ids: &[usize]) -> RelIds {
        ids.iter().copied().collect()
    }

    fn map() -> AppendRelMap {
        let mut m = AppendRelMap::new();
        for (parent, pname, child, cname) in [(1, "a", 10, "a_p0"), (1, "a", 11, "a_p1"), (2, "b", 20, "b_p0")] {
            m.add(AppendRelInfo {
                parent_relid: parent,
                child_relid: child,
                parent_name: pname.into(),
                child_name: cname.into(),
            });
        }
        m
    }

    #[test]
    fn test_translate_relids_only_touches_matching_parents() {
        let m = map();
        assert_eq!(m.translate_relids(&set(&[1, 3]), &set(&[11])), set(&[3, 11]));
        assert_eq!(m.translate_relids(&set(&[2]), &set(&[11])), set(&[2]));
    }

    #[test]
    fn test_translate_special_join_per_side() {
        let m = map();
        let parent = SpecialJoinInfo::new(JoinKind::Left, set(&[1]), set(&[2])).strict();
        let child = m.translate_special_join(&parent, &set(&[10]), &set(&[20]));
        assert_eq!(child.min_lefthand, set(&[10]));
        assert_eq!(child.syn_righthand, set(&[20]));
        assert!(child.lhs_strict);
    }

    #[test]
    fn test_translate_restriction_label() {
        let m = map();
        let parent = vec![RestrictInfo::new("a.k = b.k", set(&[1, 2]))];
        let child = m.translate_restrictions(&parent, &set(&[10, 20]));
        assert_eq!(child[0].label, "a_p0.k = b_p0.k");
        assert_eq!(child[0].required_relids, set(&[10, 20]));
    }

    #[test]
    fn test_translate_label_respects_identifier_boundaries() {
        let m = map();
        let parent = vec![RestrictInfo::new("ba.x = a.x AND (a.y > my_a.y)", set(&[1])).equality()];
        let child = m.translate_restrictions(&parent, &set(&[10]));
        assert_eq!(child[0].label, "ba.x = a_p0.x AND (a_p0.y > my_a.y)");
        assert!(child[0].is_equality);
    }
}
