//! Handlers for the `/session` resource: the annotator's view of the current
//! record and the navigation/save operations on it.
//!
//! Every request carries the form's current values so the server can detect
//! unsaved edits before moving.

use annotator_core::navigation::{ConfirmChoice, Direction};
use annotator_core::record::EditedValues;
use annotator_core::session::RecordView;
use annotator_core::types::RecordId;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub direction: Direction,
    #[serde(flatten)]
    pub edits: EditedValues,
}

#[derive(Debug, Deserialize)]
pub struct GotoRequest {
    pub id: RecordId,
    #[serde(flatten)]
    pub edits: EditedValues,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub choice: ConfirmChoice,
    #[serde(flatten)]
    pub edits: EditedValues,
}

type ViewResponse = AppResult<Json<DataResponse<RecordView>>>;

/// GET /api/v1/session
///
/// Show the current record, claiming it for the caller if it is unowned.
pub async fn view(State(state): State<AppState>, user: AuthUser) -> ViewResponse {
    let session = state.registry.session(&user.username).await;
    let view = session.lock().await.view().await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/session/save
pub async fn save(
    State(state): State<AppState>,
    user: AuthUser,
    Json(edits): Json<EditedValues>,
) -> ViewResponse {
    let session = state.registry.session(&user.username).await;
    let view = session.lock().await.save(&edits).await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/session/navigate
///
/// Step to the next or previous visible record. With unsaved edits the
/// response is in the `confirming_discard` state and nothing moved.
pub async fn navigate(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<NavigateRequest>,
) -> ViewResponse {
    let session = state.registry.session(&user.username).await;
    let view = session
        .lock()
        .await
        .navigate(input.direction, &input.edits)
        .await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/session/goto
pub async fn goto(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<GotoRequest>,
) -> ViewResponse {
    let session = state.registry.session(&user.username).await;
    let view = session.lock().await.goto(&input.id, &input.edits).await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/session/confirm
///
/// Resolve a pending move: save and continue, discard, or cancel.
pub async fn confirm(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<ConfirmRequest>,
) -> ViewResponse {
    let session = state.registry.session(&user.username).await;
    let view = session
        .lock()
        .await
        .confirm(input.choice, &input.edits)
        .await?;
    Ok(Json(DataResponse { data: view }))
}
