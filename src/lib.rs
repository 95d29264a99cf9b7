//! rssh -- expose TCP services behind NAT through a public SSH jump host.
//!
//! The crate is split into the three subsystems that coordinate through
//! a shared [`store`]:
//!
//! - [`api`]: the control-plane coordinator. Agents register domains and
//!   fetch connection credentials through its HTTP surface.
//! - [`gatekeeper`]: the public-facing SSH server that accepts reverse
//!   port forwards from authenticated agents and proxies inbound traffic
//!   to them.
//! - [`agent`]: runs alongside the service an operator wants exposed. It
//!   registers a domain with the control plane, then holds a reverse SSH
//!   tunnel open to the gatekeeper.
//!
//! [`identity`] and [`store`] are shared building blocks: key material
//! encoding and the etcd-backed coordination store, respectively.
//!
//! # Example
//!
//! ```rust,no_run
//! use rssh::config::Config;
//! use rssh::store::EtcdStore;
//! use rssh::api::ApiServer;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load(None::<&std::path::Path>)?;
//! let store = EtcdStore::connect(&config.etcd.endpoints).await?;
//! let server = ApiServer::new(Arc::new(store), config.api);
//! server.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod api;
pub mod cli;
pub mod config;
pub mod gatekeeper;
pub mod identity;
pub mod store;
pub mod util;

/// Returns the current version of rssh.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
