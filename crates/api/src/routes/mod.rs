pub mod admin;
pub mod auth;
pub mod health;
pub mod records;
pub mod session;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /auth/login                 login (public)
///
/// /session                    current record, claims on view (GET)
/// /session/save               save form values (POST)
/// /session/navigate           step next/prev (POST)
/// /session/goto               jump to id (POST)
/// /session/confirm            resolve unsaved-changes prompt (POST)
///
/// /records/visible            visible ids and summary (GET)
/// /stats                      progress statistics (GET)
///
/// /export                     JSONL export (POST, admin only)
/// /admin/assignments          balanced assignment (POST, admin only)
/// /admin/import               import source file (POST, admin only)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/session", session::router())
        .nest("/records", records::router())
        .route("/stats", get(handlers::records::stats))
        .route("/export", post(handlers::admin::export))
        .nest("/admin", admin::router())
}
