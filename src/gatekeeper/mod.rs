//! Gatekeeper SSH server (§4.D): publishes its meta record, wipes
//! slotfs (the single-gatekeeper invariant), then serves reverse
//! forwards and client proxy sessions.

pub mod error;
pub mod host_key;
pub mod proxy;
pub mod server;
pub mod slot;

pub use error::GatekeeperError;

use std::sync::Arc;
use std::time::Duration;

use russh::server::Server as _;
use tracing::warn;

use crate::api::types::GatekeeperMeta;
use crate::config::GatekeeperConfig;
use crate::store::{keys, Store};

pub struct Gatekeeper {
    config: GatekeeperConfig,
    store: Arc<dyn Store>,
}

impl Gatekeeper {
    pub fn new(store: Arc<dyn Store>, config: GatekeeperConfig) -> Self {
        Self { config, store }
    }

    pub async fn run(self) -> Result<(), GatekeeperError> {
        self.publish_meta().await?;

        // Single-gatekeeper invariant: wiping slotfs on boot forbids a
        // second concurrent gatekeeper from cohabiting (§5).
        warn!("wiping /gatekeeper/slotfs/ on startup -- exactly one gatekeeper must run at a time");
        self.store
            .delete_prefix(keys::SLOTFS_PREFIX, Duration::from_secs(5))
            .await?;

        let host_key = host_key::load_or_generate(&self.config.ssh_host_key)?;
        let mut ssh_config = russh::server::Config::default();
        ssh_config.keys = vec![host_key::to_russh_keypair(host_key)];
        let ssh_config = Arc::new(ssh_config);

        let addr = format!("{}:{}", self.config.ssh_addr, self.config.port);
        let mut server = server::GatekeeperServer::new(self.store.clone());
        server.run_on_address(ssh_config, addr).await?;
        Ok(())
    }

    async fn publish_meta(&self) -> Result<(), GatekeeperError> {
        let meta = GatekeeperMeta {
            ssh_addr: self.config.ssh_addr.to_string(),
            ssh_port: self.config.port,
            low_port: self.config.ssh_port_range.low,
            high_port: self.config.ssh_port_range.high,
        };
        self.store
            .set(
                keys::GATEKEEPER_META_KEY,
                serde_json::to_vec(&meta).map_err(|e| GatekeeperError::Internal(e.to_string()))?,
                Duration::from_secs(1),
            )
            .await?;
        Ok(())
    }
}
