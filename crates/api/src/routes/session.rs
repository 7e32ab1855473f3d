//! Route definitions for the `/session` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::session;
use crate::state::AppState;

/// Routes mounted at `/session`.
///
/// ```text
/// GET  /          -> view
/// POST /save      -> save
/// POST /navigate  -> navigate
/// POST /goto      -> goto
/// POST /confirm   -> confirm
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(session::view))
        .route("/save", post(session::save))
        .route("/navigate", post(session::navigate))
        .route("/goto", post(session::goto))
        .route("/confirm", post(session::confirm))
}
