//! Read-only views over the store: the caller's visible records and overall
//! progress.

use annotator_core::record::Statistics;
use annotator_core::store::RecordStore;
use annotator_core::types::RecordId;
use annotator_core::visibility::{visible_ids, VisibilitySummary};
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct VisibleRecords {
    /// Ids the caller can work on, in store order.
    pub ids: Vec<RecordId>,
    pub summary: VisibilitySummary,
    /// Entries the store could not decode.
    pub skipped: usize,
}

/// GET /api/v1/records/visible
pub async fn visible(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<VisibleRecords>>> {
    let report = state.store().load_all().await?;
    let ids = visible_ids(&report.records, Some(&user.username));
    let summary = VisibilitySummary::compute(&report.records, Some(&user.username));
    Ok(Json(DataResponse {
        data: VisibleRecords {
            ids,
            summary,
            skipped: report.skipped,
        },
    }))
}

/// GET /api/v1/stats
pub async fn stats(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<DataResponse<Statistics>>> {
    let stats = state.store().statistics().await?;
    Ok(Json(DataResponse { data: stats }))
}
