//! `rssh server`: run the control-plane coordinator (§4.C).

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::api::ApiServer;
use crate::config::Config;
use crate::store::EtcdStore;

#[derive(Args, Debug, Clone)]
pub struct ServerArgs;

impl ServerArgs {
    pub async fn execute(&self, config: Config) -> Result<()> {
        let store = EtcdStore::connect(&config.etcd.endpoints)
            .await
            .context("failed to connect to etcd")?;
        let server = ApiServer::new(std::sync::Arc::new(store), config.api);
        info!("starting control-plane coordinator");
        server
            .run(shutdown_signal())
            .await
            .context("control-plane server exited with an error")
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
