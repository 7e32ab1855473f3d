//! Balanced distribution of records across annotators.

use std::collections::{BTreeMap, HashSet};

use crate::error::CoreError;
use crate::record::RecordSet;
use crate::store::Assignment;
use crate::types::{RecordId, UserId};

/// Split `ids` into contiguous runs, one per annotator, in the given order.
///
/// Every annotator receives `ids.len() / n` records and the first
/// `ids.len() % n` receive one extra.
pub fn plan_assignment(ids: &[RecordId], annotators: &[UserId]) -> Result<Vec<Assignment>, CoreError> {
    validate_annotators(annotators)?;

    let n = annotators.len();
    let base = ids.len() / n;
    let remainder = ids.len() % n;

    let mut plan = Vec::with_capacity(ids.len());
    let mut remaining = ids.iter();
    for (i, annotator) in annotators.iter().enumerate() {
        let count = base + usize::from(i < remainder);
        plan.extend(remaining.by_ref().take(count).map(|id| Assignment {
            id: id.clone(),
            owner: annotator.clone(),
        }));
    }
    Ok(plan)
}

/// Records to distribute: only unowned ones, or all of them.
pub fn assignable_ids(records: &RecordSet, only_unassigned: bool) -> Vec<RecordId> {
    records
        .iter()
        .filter(|r| !only_unassigned || r.is_unowned())
        .map(|r| r.id.clone())
        .collect()
}

/// Per-annotator record counts of a plan.
pub fn plan_summary(plan: &[Assignment]) -> BTreeMap<UserId, usize> {
    let mut counts = BTreeMap::new();
    for a in plan {
        *counts.entry(a.owner.clone()).or_default() += 1;
    }
    counts
}

fn validate_annotators(annotators: &[UserId]) -> Result<(), CoreError> {
    if annotators.is_empty() {
        return Err(CoreError::Validation(
            "At least one annotator is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for name in annotators {
        if name.trim().is_empty() {
            return Err(CoreError::Validation("Annotator names must not be empty".to_string()));
        }
        if !seen.insert(name.as_str()) {
            return Err(CoreError::Validation(format!("Duplicate annotator '{name}'")));
        }
    }
    Ok(())
}
