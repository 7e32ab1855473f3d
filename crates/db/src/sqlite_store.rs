//! Relational [`RecordStore`] backed by a single SQLite table.
//!
//! Ownership rules are enforced inside the `UPDATE` statements themselves
//! (`WHERE owner = ''` for claims, `WHERE owner = '' OR owner = ?` for saves),
//! so concurrent writers never need an application-level lock.

use annotator_core::record::{AnnotationRecord, RecordSet, Statistics, UpsertRequest};
use annotator_core::store::{
    Assignment, ClaimOutcome, ImportMode, ImportStats, LoadReport, RecordStore, StoreError,
};
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::DbError;
use crate::models::annotation::AnnotationRow;
use crate::repositories::annotation_repo::SaveRow;
use crate::repositories::AnnotationRepo;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool whose migrations have already been applied.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch(&self, id: &str) -> Result<Option<AnnotationRecord>, StoreError> {
        match AnnotationRepo::find_by_id(&self.pool, id).await.map_err(DbError::from)? {
            Some(row) => Ok(Some(row.into_record()?)),
            None => Ok(None),
        }
    }

    async fn fetch_existing(&self, id: &str) -> Result<AnnotationRecord, StoreError> {
        self.fetch(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

fn to_row(record: &AnnotationRecord) -> Result<AnnotationRow, StoreError> {
    Ok(AnnotationRow {
        id: record.id.clone(),
        annotated: record.annotated,
        owner: record.owner.clone(),
        score: record.score,
        fields: serde_json::to_string(&record.fields)?,
        field_flags: serde_json::to_string(&record.field_flags)?,
        updated_at: record.updated_at,
    })
}

fn db(err: sqlx::Error) -> StoreError {
    DbError::from(err).into()
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn load_all(&self) -> Result<LoadReport, StoreError> {
        let rows = AnnotationRepo::list(&self.pool).await.map_err(db)?;
        let mut records = RecordSet::new();
        let mut skipped = 0;
        for row in rows {
            match row.into_record() {
                Ok(record) => records.insert(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed record");
                    skipped += 1;
                }
            }
        }
        Ok(LoadReport { records, skipped })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AnnotationRecord>, StoreError> {
        self.fetch(id).await
    }

    async fn upsert(&self, save: UpsertRequest) -> Result<AnnotationRecord, StoreError> {
        let field_flags = serde_json::to_string(&save.field_flags)?;
        let row = SaveRow {
            id: &save.id,
            user: &save.owner,
            fields: &save.fields,
            field_flags: &field_flags,
            score: save.score,
            updated_at: chrono::Utc::now(),
        };
        let changed = AnnotationRepo::save(&self.pool, &row).await.map_err(db)?;
        if changed == 0 {
            return match self.fetch(&save.id).await? {
                None => Err(StoreError::NotFound(save.id)),
                Some(existing) => Err(StoreError::OwnershipConflict {
                    id: save.id,
                    owner: existing.owner,
                }),
            };
        }
        self.fetch_existing(&save.id).await
    }

    async fn claim(&self, id: &str, user: &str) -> Result<ClaimOutcome, StoreError> {
        let changed = AnnotationRepo::claim(&self.pool, id, user).await.map_err(db)?;
        let record = self.fetch_existing(id).await?;
        if changed == 1 {
            tracing::debug!(record_id = %id, user = %user, "Owner written");
            return Ok(ClaimOutcome::Claimed(record));
        }
        if record.owner == user {
            Ok(ClaimOutcome::AlreadyOwned(record))
        } else {
            Ok(ClaimOutcome::OwnedByOther {
                owner: record.owner,
            })
        }
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        let counts = AnnotationRepo::progress(&self.pool).await.map_err(db)?;
        let owners = AnnotationRepo::count_by_owner(&self.pool).await.map_err(db)?;
        let total = counts.total as usize;
        let annotated = counts.annotated as usize;
        Ok(Statistics {
            total,
            annotated,
            pending: total.saturating_sub(annotated),
            flagged: counts.flagged as usize,
            by_owner: owners
                .into_iter()
                .map(|o| (o.owner, o.count as usize))
                .collect(),
        })
    }

    async fn assign(&self, assignments: &[Assignment]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let mut updated = 0;
        for a in assignments {
            updated += AnnotationRepo::set_owner(&mut tx, &a.id, &a.owner)
                .await
                .map_err(db)?;
        }
        tx.commit().await.map_err(db)?;
        Ok(updated as usize)
    }

    async fn import(
        &self,
        records: Vec<AnnotationRecord>,
        mode: ImportMode,
    ) -> Result<ImportStats, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        if mode == ImportMode::Replace {
            let removed = AnnotationRepo::delete_all(&mut tx).await.map_err(db)?;
            tracing::info!(removed, "Cleared annotations before import");
        }

        let mut stats = ImportStats::default();
        for record in &records {
            if AnnotationRepo::exists(&mut tx, &record.id).await.map_err(db)? {
                let fields = serde_json::to_string(&record.fields)?;
                AnnotationRepo::update_fields(&mut tx, &record.id, &fields)
                    .await
                    .map_err(db)?;
                stats.updated += 1;
            } else {
                AnnotationRepo::insert(&mut tx, &to_row(record)?)
                    .await
                    .map_err(db)?;
                stats.imported += 1;
            }
        }
        tx.commit().await.map_err(db)?;
        Ok(stats)
    }
}
