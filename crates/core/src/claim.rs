//! Claim-on-view: opening an unowned record assigns it to the viewer.

use crate::error::CoreError;
use crate::record::AnnotationRecord;
use crate::store::{ClaimOutcome, RecordStore};

/// What viewing a record means for its ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Unowned: write the viewer as owner.
    Claim,
    /// Already the viewer's: nothing to do.
    AlreadyOwned,
    /// Owned by someone else. Unreachable through the visibility filter.
    ForeignOwner,
}

impl ClaimDecision {
    pub fn decide(record: &AnnotationRecord, user: &str) -> Self {
        if record.owner.is_empty() {
            Self::Claim
        } else if record.owner == user {
            Self::AlreadyOwned
        } else {
            Self::ForeignOwner
        }
    }
}

/// Result of [`ensure_claimed`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimResult {
    /// The viewer owns the record.
    Owned(AnnotationRecord),
    /// Another user claimed the record after the snapshot was read.
    Lost { owner: String },
}

/// Make sure `user` owns `record`, claiming it if unowned.
///
/// Only the owner column is written, and only on the first call; repeated
/// calls by the same user are no-ops. A record that is already foreign in
/// `record` means the caller bypassed the visibility filter, which is
/// reported as [`CoreError::InvariantViolation`] instead of being reassigned.
/// Losing the claim to a concurrent viewer is [`ClaimResult::Lost`].
pub async fn ensure_claimed(
    store: &dyn RecordStore,
    record: AnnotationRecord,
    user: &str,
) -> Result<ClaimResult, CoreError> {
    if user.is_empty() {
        return Err(CoreError::Unauthorized(
            "An anonymous user cannot claim records".into(),
        ));
    }

    match ClaimDecision::decide(&record, user) {
        ClaimDecision::AlreadyOwned => Ok(ClaimResult::Owned(record)),
        ClaimDecision::ForeignOwner => Err(foreign_owner(&record.id, &record.owner, user)),
        ClaimDecision::Claim => match store.claim(&record.id, user).await? {
            ClaimOutcome::Claimed(updated) => {
                tracing::info!(record_id = %updated.id, user = %user, "Record claimed on view");
                Ok(ClaimResult::Owned(updated))
            }
            ClaimOutcome::AlreadyOwned(updated) => Ok(ClaimResult::Owned(updated)),
            ClaimOutcome::OwnedByOther { owner } => {
                tracing::info!(record_id = %record.id, owner = %owner, user = %user, "Record claimed by another user first");
                Ok(ClaimResult::Lost { owner })
            }
        },
    }
}

fn foreign_owner(id: &str, owner: &str, user: &str) -> CoreError {
    tracing::error!(record_id = %id, owner = %owner, user = %user, "Claim attempted on a record owned by another user");
    CoreError::InvariantViolation(format!(
        "record '{id}' is owned by '{owner}' and cannot be claimed by '{user}'"
    ))
}
