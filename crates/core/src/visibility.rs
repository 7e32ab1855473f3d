//! Ownership-based visibility.
//!
//! A record is visible to a user when it is unowned or owned by that user.
//! Visibility is always computed from a fresh [`RecordSet`] snapshot; nothing
//! here caches results across store mutations.

use serde::Serialize;

use crate::record::{AnnotationRecord, RecordSet};
use crate::types::RecordId;

/// Returns `true` if `user` may see and edit `record`.
///
/// An empty or absent user has no ownership privilege and only sees unowned
/// records.
pub fn is_visible(record: &AnnotationRecord, user: Option<&str>) -> bool {
    match user.filter(|u| !u.is_empty()) {
        Some(u) => record.owner.is_empty() || record.owner == u,
        None => record.owner.is_empty(),
    }
}

/// Ids visible to `user`, in the snapshot's stable order.
pub fn visible_ids(records: &RecordSet, user: Option<&str>) -> Vec<RecordId> {
    records
        .iter()
        .filter(|r| is_visible(r, user))
        .map(|r| r.id.clone())
        .collect()
}

/// Counts shown in the annotator's banner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisibilitySummary {
    /// Records the user can work on.
    pub visible: usize,
    /// Records held by other annotators.
    pub others: usize,
}

impl VisibilitySummary {
    pub fn compute(records: &RecordSet, user: Option<&str>) -> Self {
        let visible = records.iter().filter(|r| is_visible(r, user)).count();
        Self {
            visible,
            others: records.len() - visible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(id: &str, owner: &str) -> AnnotationRecord {
        let mut r = AnnotationRecord::new(id);
        r.owner = owner.to_string();
        r
    }

    fn sample() -> RecordSet {
        [
            owned("a", ""),
            owned("b", "alice"),
            owned("c", "bob"),
            owned("d", ""),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn user_sees_unowned_and_own_records_in_order() {
        assert_eq!(visible_ids(&sample(), Some("alice")), vec!["a", "b", "d"]);
        assert_eq!(visible_ids(&sample(), Some("bob")), vec!["a", "c", "d"]);
    }

    #[test]
    fn missing_or_empty_user_sees_only_unowned() {
        assert_eq!(visible_ids(&sample(), None), vec!["a", "d"]);
        assert_eq!(visible_ids(&sample(), Some("")), vec!["a", "d"]);
    }

    #[test]
    fn visibility_matches_owner_rule_for_every_pair() {
        let set = sample();
        for user in ["alice", "bob", "carol"] {
            let ids = visible_ids(&set, Some(user));
            for record in set.iter() {
                let expected = record.owner.is_empty() || record.owner == user;
                assert_eq!(ids.contains(&record.id), expected, "{user} / {}", record.id);
            }
        }
    }

    #[test]
    fn order_is_stable_between_calls() {
        let set = sample();
        assert_eq!(visible_ids(&set, Some("alice")), visible_ids(&set, Some("alice")));
    }

    #[test]
    fn summary_counts_others() {
        let summary = VisibilitySummary::compute(&sample(), Some("alice"));
        assert_eq!(summary, VisibilitySummary { visible: 3, others: 1 });
    }
}
