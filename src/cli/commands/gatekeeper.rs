//! `rssh gatekeeper`: run the reverse-tunnel SSH server (§4.D).

use anyhow::{Context, Result};
use clap::Args;

use crate::config::Config;
use crate::gatekeeper::Gatekeeper;
use crate::store::EtcdStore;

#[derive(Args, Debug, Clone)]
pub struct GatekeeperArgs;

impl GatekeeperArgs {
    pub async fn execute(&self, config: Config) -> Result<()> {
        let store = EtcdStore::connect(&config.etcd.endpoints)
            .await
            .context("failed to connect to etcd")?;
        let gatekeeper = Gatekeeper::new(std::sync::Arc::new(store), config.gatekeeper);
        gatekeeper
            .run()
            .await
            .context("gatekeeper server exited with an error")
    }
}
