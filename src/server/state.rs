//! Shared state handed to every axum handler.

use std::sync::Arc;

use crate::sync_manager::SyncManager;

#[derive(Clone)]
pub struct AppState {
    pub sync_manager: Arc<SyncManager>,
}
