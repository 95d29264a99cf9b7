//! Outbound SSH client (§4.E item 4): dial the gatekeeper, authenticate
//! as `rssh_agent`, request the assigned reverse forward, and splice
//! every forwarded channel to the local target.
//!
//! Grounded on the teacher's `connection/russh::ClientHandler` for the
//! `russh::client::Handler` shape and connect/authenticate sequence,
//! and on the pack's `zync` tunnel client
//! (`other_examples/...zync-sh-zync__src-tauri-src-ssh.rs.rs`) for
//! `server_channel_open_forwarded_tcpip`, the only client-side forwarded-
//! channel callback in the corpus.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::keys::key::{KeyPair, PublicKey};
use russh::{Channel, Disconnect};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::identity::GATEKEEPER_SSH_USER;

use super::error::AgentError;
use super::ForwardedHost;

struct AgentClientHandler {
    /// The local target every forwarded channel for this connection
    /// splices to -- one gatekeeper connection per identity, so this
    /// is fixed for the handler's lifetime.
    target: (String, u16),
}

#[async_trait]
impl client::Handler for AgentClientHandler {
    type Error = russh::Error;

    /// The gatekeeper's host key isn't provisioned out of band; accept
    /// on first connection (spec.md names no known_hosts mechanism for
    /// the agent side).
    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        info!(
            connected_address,
            connected_port, originator_address, originator_port, "accepted forwarded channel"
        );
        let (host, port) = self.target.clone();
        tokio::spawn(async move {
            match TcpStream::connect((host.as_str(), port)).await {
                Ok(mut tcp) => {
                    let mut stream = channel.into_stream();
                    if let Err(e) = tokio::io::copy_bidirectional(&mut stream, &mut tcp).await {
                        warn!(error = %e, "splice to local target ended with error");
                    }
                }
                Err(e) => warn!(host, port, error = %e, "failed to dial local target"),
            }
        });
        Ok(())
    }
}

/// Dial `gatekeeper_addr`, authenticate with `host`'s imported
/// identity, and issue a global `tcpip-forward` for `slot_port`. Runs
/// until the SSH context closes or fails, at which point the caller
/// (the per-identity supervisor task) decides whether to retry.
pub async fn run(gatekeeper_addr: (String, u16), slot_port: u16, host: &ForwardedHost) -> Result<(), AgentError> {
    let key = host.credentials.private_rsa_key()?;
    let key_pair = Arc::new(KeyPair::RSA {
        key,
        hash: russh::keys::key::SignatureHash::SHA2_256,
    });

    let config = Arc::new(client::Config::default());
    let handler = AgentClientHandler {
        target: (host.host.clone(), host.port),
    };

    let mut session: Handle<AgentClientHandler> =
        client::connect(config, gatekeeper_addr.clone(), handler).await?;

    let authenticated = session
        .authenticate_publickey(GATEKEEPER_SSH_USER, key_pair)
        .await?;
    if !authenticated {
        return Err(AgentError::Internal(format!(
            "gatekeeper rejected public-key authentication for {}",
            host.domain
        )));
    }

    let bind_addr = "127.0.0.1".to_string();
    let accepted = session
        .tcpip_forward(bind_addr, slot_port as u32)
        .await?;
    if !accepted {
        session
            .disconnect(Disconnect::ByApplication, "forward request rejected", "en")
            .await?;
        return Err(AgentError::Internal(format!(
            "gatekeeper rejected tcpip-forward for {} on port {slot_port}",
            host.domain
        )));
    }

    info!(domain = %host.domain, port = slot_port, "reverse forward established");

    // Forwarded channels arrive through `server_channel_open_forwarded_tcpip`
    // above; a parked session channel (same keepalive idiom the teacher
    // uses to probe liveness) detects the transport closing so this
    // function returns instead of blocking forever on a dead socket.
    let mut keepalive = session.channel_open_session().await?;
    while keepalive.wait().await.is_some() {}

    Ok(())
}
