//! Route definitions for `/admin`.

use axum::routing::post;
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`. Every handler requires the `admin` role.
///
/// ```text
/// POST /assignments  -> assign
/// POST /import       -> import
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assignments", post(admin::assign))
        .route("/import", post(admin::import))
}
