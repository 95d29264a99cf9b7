//! Shared application state for the control-plane HTTP service.

use std::sync::Arc;

use crate::config::ApiConfig;
use crate::store::Store;

/// Shared state injected into every handler via axum's `State`
/// extractor. The store is the only synchronization surface between
/// requests (§5: "the store is the sole synchronization surface").
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: ApiConfig) -> Self {
        Self { store, config }
    }
}
