//! Administrative handlers: export, bulk assignment and import.
//!
//! All of them require the `admin` role.

use std::collections::BTreeMap;
use std::path::PathBuf;

use annotator_core::assignment::{assignable_ids, plan_assignment, plan_summary};
use annotator_core::store::{ImportMode, RecordStore};
use annotator_core::types::UserId;
use annotator_db::transfer::{export_jsonl, import_file, ImportReport};
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub path: PathBuf,
}

/// POST /api/v1/export
///
/// Write every record to a new timestamped JSONL file under `EXPORT_DIR`.
pub async fn export(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> AppResult<Json<DataResponse<ExportResponse>>> {
    let path = export_jsonl(state.store().as_ref(), &state.config.export_dir).await?;
    tracing::info!(admin = %admin.username, path = %path.display(), "Records exported");
    Ok(Json(DataResponse {
        data: ExportResponse { path },
    }))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub annotators: Vec<UserId>,
    /// Only hand out records nobody owns yet.
    #[serde(default)]
    pub only_unassigned: bool,
}

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub updated: usize,
    pub per_annotator: BTreeMap<UserId, usize>,
}

/// POST /api/v1/admin/assignments
///
/// Split the records into contiguous, balanced runs, one per annotator.
pub async fn assign(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(input): Json<AssignRequest>,
) -> AppResult<Json<DataResponse<AssignResponse>>> {
    let report = state.store().load_all().await?;
    let ids = assignable_ids(&report.records, input.only_unassigned);
    let plan = plan_assignment(&ids, &input.annotators)?;
    let updated = state.store().assign(&plan).await?;

    tracing::info!(
        admin = %admin.username,
        annotators = input.annotators.len(),
        updated,
        "Records assigned"
    );
    Ok(Json(DataResponse {
        data: AssignResponse {
            updated,
            per_annotator: plan_summary(&plan),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Source file on the server, JSONL or a JSON array.
    pub path: PathBuf,
    #[serde(default)]
    pub mode: ImportMode,
    /// Prefixed to relative `image_url*` values.
    pub image_base_path: Option<String>,
}

/// POST /api/v1/admin/import
pub async fn import(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(input): Json<ImportRequest>,
) -> AppResult<Json<DataResponse<ImportReport>>> {
    let report = import_file(
        state.store().as_ref(),
        &input.path,
        input.mode,
        input.image_base_path.as_deref(),
    )
    .await?;
    tracing::info!(admin = %admin.username, mode = ?input.mode, "Import requested");
    Ok(Json(DataResponse { data: report }))
}
