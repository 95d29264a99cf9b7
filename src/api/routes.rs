//! Route table for the three endpoints in §6's external interface.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::state::AppState;

pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/register/:domain", post(handlers::register))
        .route("/auth/:domain", post(handlers::auth))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::store::fake::FakeStore;

    #[test]
    fn router_builds_without_panicking() {
        let state = Arc::new(AppState::new(Arc::new(FakeStore::new()), ApiConfig::default()));
        let _router = api_routes(state);
    }
}
