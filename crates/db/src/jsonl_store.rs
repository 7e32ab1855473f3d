//! File-backed [`RecordStore`]: one JSON object per line (or a JSON array of
//! such objects), rewritten in full on every mutation.
//!
//! Write path for every mutation, inside the store lock:
//!
//! 1. encode the new collection and write it to `<file>.tmp`, then fsync;
//! 2. copy the current primary file into `backups/backup_<timestamp>.<ext>`;
//! 3. rename the temporary file over the primary.
//!
//! The in-memory copy is only replaced after step 3 succeeds, so a failed
//! write leaves the file, the backups and the served state as they were.

use std::path::{Path, PathBuf};

use annotator_core::codec::{self, SourceFormat};
use annotator_core::record::{AnnotationRecord, RecordSet, UpsertRequest};
use annotator_core::store::{
    Assignment, ClaimOutcome, ImportMode, ImportStats, LoadReport, RecordStore, StoreError,
};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::files;

/// Directory name for backups, next to the primary file.
pub const BACKUP_DIR_NAME: &str = "backups";

struct FileState {
    records: RecordSet,
    format: SourceFormat,
    skipped: usize,
}

pub struct JsonlStore {
    path: PathBuf,
    backup_dir: PathBuf,
    state: Mutex<FileState>,
}

impl JsonlStore {
    /// Open (or create empty) the primary file and load it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let backup_dir = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(BACKUP_DIR_NAME);

        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StoreError::io(parent, e))?;
                }
                fs::write(&path, b"")
                    .await
                    .map_err(|e| StoreError::io(&path, e))?;
                tracing::info!(path = %path.display(), "Created empty record file");
                String::new()
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let parsed = codec::parse_source(&text).map_err(|e| StoreError::Backend(e.to_string()))?;
        if parsed.skipped > 0 {
            tracing::warn!(
                path = %path.display(),
                skipped = parsed.skipped,
                "Some records could not be decoded"
            );
        }
        tracing::info!(
            path = %path.display(),
            records = parsed.records.len(),
            "Record file loaded"
        );

        Ok(Self {
            path,
            backup_dir,
            state: Mutex::new(FileState {
                records: parsed.records.into_iter().collect(),
                format: parsed.format,
                skipped: parsed.skipped,
            }),
        })
    }

    /// Keep backups somewhere other than `<parent>/backups`.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Write `records` to disk using the temp-file, backup, rename sequence.
    async fn persist(&self, records: &RecordSet, format: SourceFormat) -> Result<(), StoreError> {
        let body = codec::encode(format, records.iter())?;
        let tmp = files::tmp_path(&self.path);

        if let Err(e) = files::write_synced(&tmp, body.as_bytes()).await {
            files::remove_quietly(&tmp).await;
            return Err(self.write_failed(StoreError::io(&tmp, e)));
        }

        let backup = match files::backup(&self.path, &self.backup_dir).await {
            Ok(backup) => backup,
            Err(e) => {
                files::remove_quietly(&tmp).await;
                return Err(self.write_failed(StoreError::io(&self.backup_dir, e)));
            }
        };

        if let Err(e) = files::commit(&tmp, &self.path, backup.as_deref()).await {
            return Err(self.write_failed(StoreError::io(&self.path, e)));
        }
        if let Some(backup) = backup {
            tracing::debug!(backup = %backup.display(), "Backup written");
        }
        Ok(())
    }

    fn write_failed(&self, err: StoreError) -> StoreError {
        tracing::error!(
            path = %self.path.display(),
            reason = err.reason(),
            error = %err,
            "Failed to write record file"
        );
        err
    }

    /// Apply `mutate` to a copy of the collection and persist it; the served
    /// state only changes once the write succeeded.
    async fn mutate<T>(
        &self,
        mutate: impl FnOnce(&mut RecordSet) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock().await;
        let mut working = state.records.clone();
        let out = mutate(&mut working)?;
        self.persist(&working, state.format).await?;
        state.records = working;
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for JsonlStore {
    async fn load_all(&self) -> Result<LoadReport, StoreError> {
        let state = self.state.lock().await;
        Ok(LoadReport {
            records: state.records.clone(),
            skipped: state.skipped,
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AnnotationRecord>, StoreError> {
        Ok(self.state.lock().await.records.get(id).cloned())
    }

    async fn upsert(&self, save: UpsertRequest) -> Result<AnnotationRecord, StoreError> {
        let now = chrono::Utc::now();
        self.mutate(|records| {
            let record = records
                .get_mut(&save.id)
                .ok_or_else(|| StoreError::NotFound(save.id.clone()))?;
            if !record.owner.is_empty() && record.owner != save.owner {
                return Err(StoreError::OwnershipConflict {
                    id: save.id.clone(),
                    owner: record.owner.clone(),
                });
            }
            record.apply_save(&save, now);
            Ok(record.clone())
        })
        .await
    }

    async fn claim(&self, id: &str, user: &str) -> Result<ClaimOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let current = state
            .records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if current.owner == user {
            return Ok(ClaimOutcome::AlreadyOwned(current.clone()));
        }
        if !current.owner.is_empty() {
            return Ok(ClaimOutcome::OwnedByOther {
                owner: current.owner.clone(),
            });
        }

        let mut working = state.records.clone();
        let claimed = match working.get_mut(id) {
            Some(record) => {
                record.owner = user.to_string();
                record.clone()
            }
            None => return Err(StoreError::NotFound(id.to_string())),
        };
        self.persist(&working, state.format).await?;
        state.records = working;
        Ok(ClaimOutcome::Claimed(claimed))
    }

    async fn assign(&self, assignments: &[Assignment]) -> Result<usize, StoreError> {
        self.mutate(|records| {
            let mut updated = 0;
            for a in assignments {
                if let Some(record) = records.get_mut(&a.id) {
                    record.owner = a.owner.clone();
                    updated += 1;
                }
            }
            Ok(updated)
        })
        .await
    }

    async fn import(
        &self,
        incoming: Vec<AnnotationRecord>,
        mode: ImportMode,
    ) -> Result<ImportStats, StoreError> {
        self.mutate(|records| {
            if mode == ImportMode::Replace {
                *records = RecordSet::new();
            }
            let mut stats = ImportStats::default();
            for record in incoming {
                match records.get_mut(&record.id) {
                    Some(existing) => {
                        existing.fields = record.fields;
                        stats.updated += 1;
                    }
                    None => {
                        records.insert(record);
                        stats.imported += 1;
                    }
                }
            }
            Ok(stats)
        })
        .await
    }
}
