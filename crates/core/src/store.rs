//! The persistence seam.
//!
//! [`RecordStore`] is implemented by the file and SQLite backends in
//! `annotator-db`. Every mutating method is a single critical section: the
//! ownership check and the write happen without another mutation
//! interleaving, so two users racing to claim the same unowned record end up
//! with exactly one owner.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::record::{AnnotationRecord, RecordSet, Statistics, UpsertRequest};
use crate::types::{RecordId, UserId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures raised by a record store. [`StoreError::reason`] gives a stable,
/// machine-readable code for each variant.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode records: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Record {id} is owned by {owner}")]
    OwnershipConflict { id: RecordId, owner: UserId },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io_error",
            Self::Encode(_) => "encode_error",
            Self::Backend(_) => "backend_error",
            Self::NotFound(_) => "not_found",
            Self::OwnershipConflict { .. } => "ownership_conflict",
        }
    }

    /// Whether the failure happened while writing (as opposed to a rejected
    /// precondition).
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Encode(_) | Self::Backend(_))
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A full snapshot of the store.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub records: RecordSet,
    /// Entries that could not be decoded and were skipped.
    pub skipped: usize,
}

/// Outcome of a claim-on-view write.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The record was unowned and now belongs to the caller.
    Claimed(AnnotationRecord),
    /// The caller already owned the record; nothing was written.
    AlreadyOwned(AnnotationRecord),
    /// Someone else owns the record; nothing was written.
    OwnedByOther { owner: UserId },
}

/// Administrative owner assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub id: RecordId,
    pub owner: UserId,
}

/// How [`RecordStore::import`] treats existing content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Drop every existing record first.
    Replace,
    /// Insert new ids; for existing ids refresh the field values only and
    /// keep ownership, flags, score and annotation state.
    #[default]
    Incremental,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub imported: usize,
    pub updated: usize,
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Durable keyed storage of annotation records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load every record in stable order, skipping malformed entries.
    async fn load_all(&self) -> Result<LoadReport, StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<AnnotationRecord>, StoreError>;

    /// Persist a save: fields, flags and score are written, `annotated` is
    /// set, `updated_at` stamped, and the owner set to `save.owner` if the
    /// record was unowned. Fails with [`StoreError::OwnershipConflict`] when
    /// another user owns the record.
    async fn upsert(&self, save: UpsertRequest) -> Result<AnnotationRecord, StoreError>;

    /// Assign an unowned record to `user`, touching the owner only.
    async fn claim(&self, id: &str, user: &str) -> Result<ClaimOutcome, StoreError>;

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let report = self.load_all().await?;
        Ok(Statistics::from_records(report.records.iter()))
    }

    /// Overwrite owners. Administrative only; never reached from the
    /// claim-on-view path. Returns the number of records updated.
    async fn assign(&self, assignments: &[Assignment]) -> Result<usize, StoreError>;

    /// Bulk-load records from an import source.
    async fn import(
        &self,
        records: Vec<AnnotationRecord>,
        mode: ImportMode,
    ) -> Result<ImportStats, StoreError>;
}
