//! Control-plane HTTP service (§4.C): register, authenticate, health.
//!
//! Generalizes the teacher's axum API module (`mod`/`state`/`error`/
//! `routes`/`handlers`) from playbook/job endpoints to the three
//! endpoints this system exposes.

pub mod context;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod types;

pub use context::RequestContext;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use types::{AgentSlot, ApiMeta, GatekeeperMeta};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::store::{keys, Store};

pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(store: Arc<dyn Store>, config: ApiConfig) -> Self {
        let state = Arc::new(AppState::new(store, config.clone()));
        Self { config, state }
    }

    fn router(&self) -> axum::Router {
        routes::api_routes(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Publish `/meta/api`, then serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) -> anyhow::Result<()> {
        self.publish_meta().await?;
        let addr = SocketAddr::new(self.config.addr, self.config.port);
        info!(%addr, "control-plane listening");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }

    async fn publish_meta(&self) -> anyhow::Result<()> {
        let meta = ApiMeta {
            domain: self.config.domain.clone(),
            addr: self.config.addr.to_string(),
            port: self.config.port,
        };
        self.state
            .store
            .set(
                keys::API_META_KEY,
                serde_json::to_vec(&meta)?,
                Duration::from_secs(1),
            )
            .await?;
        Ok(())
    }
}
