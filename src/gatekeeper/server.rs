//! The gatekeeper's `russh::server::Handler` implementation (§4.D).
//!
//! Grounded on the reverse-tunnel server shape in the pack's standalone
//! `tunnl` example (`russh::server::{Auth, Handler, Server, Session}`,
//! `auth_publickey`/`tcpip_forward`/`channel_open_session` callbacks) --
//! the only server-side russh code in the corpus, since the teacher
//! only ever drives russh as a client. Unlike that example's "virtual
//! bind", this gatekeeper binds a real listener per §4.D item 4: the
//! reverse-forward is a real port other SSH clients dial into.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::key::PublicKey;
use russh::server::{Auth, Handle, Handler, Msg, Server as RusshServer, Session};
use russh::{Channel, ChannelId};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::identity::GATEKEEPER_SSH_USER;
use crate::store::Store;
use crate::util::split_domain_request;

use super::error::GatekeeperError;
use super::{proxy, slot};

/// State shared by every connection handler.
#[derive(Clone)]
pub struct Shared {
    pub store: Arc<dyn Store>,
}

#[derive(Clone)]
pub struct GatekeeperServer {
    shared: Shared,
}

impl GatekeeperServer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            shared: Shared { store },
        }
    }
}

impl RusshServer for GatekeeperServer {
    type Handler = SshHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        SshHandler {
            shared: self.shared.clone(),
            peer_addr,
            client_key: None,
            pending_sessions: HashMap::new(),
            established_slots: Vec::new(),
        }
    }

    fn handle_session_error(&mut self, error: <Self::Handler as Handler>::Error) {
        warn!(%error, "ssh session terminated with error");
    }
}

pub struct SshHandler {
    shared: Shared,
    peer_addr: Option<SocketAddr>,
    /// The public key the connecting agent authenticated with, kept so
    /// `tcpip_forward` can bind-check it against the slot's `agentID`
    /// (§9 Open Question 3).
    client_key: Option<PublicKey>,
    /// Session channels opened but not yet `exec`'d, keyed by channel id.
    pending_sessions: HashMap<ChannelId, Channel<Msg>>,
    /// Ports this connection has established, so they can be released
    /// the moment the SSH context goes away.
    established_slots: Vec<(u16, Vec<u8>)>,
}

impl Drop for SshHandler {
    fn drop(&mut self) {
        let store = self.shared.store.clone();
        let slots = std::mem::take(&mut self.established_slots);
        if slots.is_empty() {
            return;
        }
        tokio::spawn(async move {
            for (port, previous) in slots {
                if let Err(e) = slot::release(store.as_ref(), port, &previous).await {
                    warn!(port, error = %e, "failed to release slot on disconnect");
                }
            }
        });
    }
}

impl SshHandler {
    /// Fetch the public key on file for `domain`'s owning agent and
    /// compare its fingerprint to the key this connection authenticated
    /// with.
    async fn connecting_key_matches_domain(&self, domain: &str) -> Result<bool, GatekeeperError> {
        let Some(client_key) = &self.client_key else {
            return Ok(false);
        };
        let bytes = self
            .shared
            .store
            .get(
                &crate::store::keys::domain_key(domain),
                std::time::Duration::from_secs(1),
            )
            .await?;
        let record = crate::identity::DomainRecord::from_json(&bytes)?;
        let line = record.credentials().public_key.clone();
        let encoded = line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| GatekeeperError::Internal("malformed stored public key".into()))?;
        let key_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
            .map_err(|e| GatekeeperError::Internal(format!("stored key not valid base64: {e}")))?;
        let stored_key = russh::keys::key::parse_public_key(&key_bytes, None)
            .map_err(|e| GatekeeperError::Internal(format!("stored key unparseable: {e}")))?;
        Ok(stored_key.fingerprint() == client_key.fingerprint())
    }
}

#[async_trait]
impl Handler for SshHandler {
    type Error = GatekeeperError;

    async fn auth_publickey(&mut self, user: &str, public_key: &PublicKey) -> Result<Auth, Self::Error> {
        if user != GATEKEEPER_SSH_USER {
            return Ok(Auth::Reject {
                proceed_with_methods: None,
            });
        }
        info!(
            peer = ?self.peer_addr,
            fingerprint = %public_key.fingerprint(),
            "agent authenticated"
        );
        self.client_key = Some(public_key.clone());
        Ok(Auth::Accept)
    }

    /// Reverse-port-forward callback (§4.D item 4).
    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let requested_port = *port as u16;
        let (existing, previous_bytes) = match slot::get(self.shared.store.as_ref(), requested_port).await
        {
            Ok(pair) => pair,
            Err(_) => {
                warn!(port = requested_port, "forward request for unknown slot");
                return Ok(false);
            }
        };
        if existing.established {
            warn!(port = requested_port, "forward request for already-established slot");
            return Ok(false);
        }
        if !self
            .connecting_key_matches_domain(&existing.domain)
            .await
            .unwrap_or(false)
        {
            warn!(
                port = requested_port,
                domain = %existing.domain,
                "connecting key does not match slot's agent identity"
            );
            return Ok(false);
        }

        let (_established, new_bytes) = slot::mark_established(self.shared.store.as_ref(), existing).await?;
        self.established_slots.push((requested_port, new_bytes));

        let bind_addr = address.to_string();
        let handle = session.handle();
        let port_u32 = *port;
        tokio::spawn(async move {
            if let Err(e) = run_forward_listener(handle, bind_addr, port_u32, requested_port).await {
                warn!(port = requested_port, error = %e, "forward listener exited");
            }
        });

        Ok(true)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.pending_sessions.insert(channel.id(), channel);
        Ok(true)
    }

    /// Shell/proxy handler (§4.D item 5): the exec payload is the
    /// target FQDN, verbatim.
    async fn exec_request(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(channel) = self.pending_sessions.remove(&channel_id) else {
            return Ok(());
        };
        let fqdn = String::from_utf8_lossy(data).trim().to_string();
        let (sub, _root) = split_domain_request(&fqdn);
        let store = self.shared.store.clone();

        match slot::find_by_domain(store.as_ref(), &sub).await? {
            Some(found) if found.established => {
                session.channel_success(channel_id)?;
                tokio::spawn(async move {
                    match TcpStream::connect(("127.0.0.1", found.port)).await {
                        Ok(tcp) => {
                            let stream = channel.into_stream();
                            if let Err(e) = proxy::splice(stream, tcp).await {
                                warn!(domain = %sub, error = %e, "proxy splice failed");
                            }
                        }
                        Err(e) => warn!(domain = %sub, port = found.port, error = %e, "dial failed"),
                    }
                });
            }
            _ => {
                session.channel_success(channel_id)?;
                let message = format!("Domain {fqdn} not found.\r\n");
                session.data(channel_id, message.into_bytes().into())?;
                session.close(channel_id)?;
            }
        }
        Ok(())
    }
}

/// Binds the real listener for a `tcpip-forward` request and, for each
/// accepted connection, opens a forwarded-tcpip channel back over the
/// agent's transport and splices the two together.
async fn run_forward_listener(
    handle: Handle,
    bind_addr: String,
    bind_port: u32,
    slot_port: u16,
) -> Result<(), GatekeeperError> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", slot_port)).await?;
    info!(port = slot_port, "bound reverse-forward listener");
    loop {
        let (tcp, peer) = listener.accept().await?;
        let handle = handle.clone();
        let bind_addr = bind_addr.clone();
        tokio::spawn(async move {
            let originator_ip = peer.ip().to_string();
            let originator_port = peer.port() as u32;
            match handle
                .channel_open_forwarded_tcpip(bind_addr, bind_port, originator_ip, originator_port)
                .await
            {
                Ok(channel) => {
                    let stream = channel.into_stream();
                    if let Err(e) = proxy::splice(stream, tcp).await {
                        warn!(port = slot_port, error = %e, "forwarded splice failed");
                    }
                }
                Err(e) => warn!(port = slot_port, error = %e, "failed to open forwarded-tcpip channel"),
            }
        });
    }
}
