use std::sync::Arc;

use annotator_core::session::SessionRegistry;
use annotator_core::store::RecordStore;

use crate::config::ServerConfig;
use crate::users::UserDirectory;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Per-annotator sessions plus the store, schema and asset resolver they share.
    pub registry: Arc<SessionRegistry>,
    pub users: Arc<UserDirectory>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.registry.context().store
    }
}
