//! Agent runtime (§4.E), grounded on
//! `original_source/pkg/agent/{agent,fs,credentials,register}.go`'s
//! `Agent`/`ForwardedHost` split.

pub mod connect;
pub mod error;
pub mod fs;
pub mod register;

pub use error::AgentError;

use std::path::PathBuf;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::identity::AgentCredentials;
use crate::util::split_domain_request;

/// One imported identity: the local target it forwards to, and the
/// credentials used to authenticate against the gatekeeper.
#[derive(Debug, Clone)]
pub struct ForwardedHost {
    pub domain: String,
    pub host: String,
    pub port: u16,
    pub uid: Uuid,
    pub credentials: AgentCredentials,
}

pub struct Agent {
    root_directory: PathBuf,
    api_port: u16,
    http: reqwest::Client,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            root_directory: config.root_directory,
            api_port: config.api_port,
            http: reqwest::Client::new(),
        }
    }

    /// `agent register` (§4.E items 1-2): ensure the on-disk layout
    /// exists, then register `fqdn` with the control plane and persist
    /// the minted identity.
    pub async fn register(&self, fqdn: &str, host: &str, port: u16) -> Result<AgentCredentials, AgentError> {
        fs::ensure_directories(&self.root_directory)?;
        register::register_host(&self.http, self.api_port, &self.root_directory, fqdn, host, port).await
    }

    pub fn list_identities(&self) -> Result<Vec<ForwardedHost>, AgentError> {
        fs::ensure_directories(&self.root_directory)?;
        fs::import_identities(&self.root_directory)
    }

    pub fn remove_identity(&self, domain: &str) -> Result<(), AgentError> {
        let dir = fs::identities_dir(&self.root_directory);
        let key_path = dir.join(format!("id_rsa.{domain}"));
        std::fs::remove_file(&key_path)?;
        let _ = std::fs::remove_file(fs::public_key_path(&key_path));
        Ok(())
    }

    /// `agent connect` (§4.E items 3-5): import every identity and keep
    /// a supervisor task alive per host; one identity's dial/auth
    /// failure is logged and skipped, the rest keep running.
    pub async fn run(&self) -> Result<(), AgentError> {
        let hosts = self.list_identities()?;
        if hosts.is_empty() {
            warn!("no identities to connect; run `agent register` first");
            return Ok(());
        }

        let mut tasks = Vec::with_capacity(hosts.len());
        for host in hosts {
            let http = self.http.clone();
            let api_port = self.api_port;
            tasks.push(tokio::spawn(async move {
                if let Err(e) = Self::run_one(&http, api_port, &host).await {
                    error!(domain = %host.domain, error = %e, "identity connection failed");
                }
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    async fn run_one(http: &reqwest::Client, api_port: u16, host: &ForwardedHost) -> Result<(), AgentError> {
        let (_, root_domain) = split_domain_request(&host.domain);
        let auth = register::fetch_auth(http, api_port, &host.domain, host.uid).await?;
        info!(
            domain = %host.domain,
            port = auth.port,
            gatekeeper = %auth.gk.ssh_addr,
            "assigned reverse-forward slot"
        );
        connect::run((root_domain, auth.gk.ssh_port), auth.port, host).await
    }
}
