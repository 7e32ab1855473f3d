//! Bulk import from JSONL / JSON-array sources and JSONL export.

use std::path::{Path, PathBuf};

use annotator_core::codec;
use annotator_core::error::CoreError;
use annotator_core::store::{ImportMode, ImportStats, RecordStore, StoreError};
use serde::Serialize;

use crate::files;

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    #[serde(flatten)]
    pub stats: ImportStats,
    /// Source entries that could not be decoded.
    pub skipped: usize,
}

/// Load `source` into `store`.
///
/// `image_base_path`, when given, is prefixed to relative `image_url*`
/// values.
pub async fn import_file(
    store: &dyn RecordStore,
    source: &Path,
    mode: ImportMode,
    image_base_path: Option<&str>,
) -> Result<ImportReport, CoreError> {
    let text = tokio::fs::read_to_string(source)
        .await
        .map_err(|e| StoreError::io(source, e))?;
    let parsed = codec::parse_source(&text)?;

    let mut records = parsed.records;
    if let Some(base) = image_base_path.filter(|b| !b.is_empty()) {
        for record in &mut records {
            codec::prefix_image_paths(record, base);
        }
    }

    let stats = store.import(records, mode).await?;
    tracing::info!(
        source = %source.display(),
        mode = ?mode,
        imported = stats.imported,
        updated = stats.updated,
        skipped = parsed.skipped,
        "Import finished"
    );
    Ok(ImportReport {
        stats,
        skipped: parsed.skipped,
    })
}

/// Write every record to `dir/export_<timestamp>.jsonl` in the file
/// backend's line format. Returns the path written.
pub async fn export_jsonl(store: &dyn RecordStore, dir: &Path) -> Result<PathBuf, StoreError> {
    let report = store.load_all().await?;
    let body = codec::encode_lines(report.records.iter());

    let (file, path) = files::create_unique(dir, "export", "jsonl")
        .await
        .map_err(|e| StoreError::io(dir, e))?;
    files::fill_synced(file, body.as_bytes())
        .await
        .map_err(|e| StoreError::io(&path, e))?;

    tracing::info!(
        path = %path.display(),
        records = report.records.len(),
        "Export written"
    );
    Ok(path)
}
