use axum::routing::get;
use axum::Router;

use crate::handlers::records;
use crate::state::AppState;

/// Routes mounted at `/records`.
pub fn router() -> Router<AppState> {
    Router::new().route("/visible", get(records::visible))
}
