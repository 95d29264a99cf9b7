//! Wire and store record types named in §3/§6: `GatekeeperMeta`,
//! `APIMeta`, `AgentSlot`, and the HTTP request/response bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::AgentCredentialsWire;

/// `/meta/gatekeeper`. Written once at gatekeeper startup, read by the
/// control plane during slot allocation. Wire/JSON fields are
/// `sshAddr`/`sshPort`/`lowPort`/`highPort`, per spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatekeeperMeta {
    pub ssh_addr: String,
    pub ssh_port: u16,
    pub low_port: u16,
    pub high_port: u16,
}

/// `/meta/api`. Informational only (§9 Open Question 5: nothing reads
/// it back, kept for observability).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMeta {
    pub domain: String,
    pub addr: String,
    pub port: u16,
}

/// `/gatekeeper/slotfs/{port}`. A reservation of one gatekeeper
/// listener port for one subdomain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSlot {
    pub domain: String,
    pub port: u16,
    pub agent_id: Uuid,
    pub established: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(rename = "agentID")]
    pub agent_id: AgentCredentialsWire,
    pub error: Option<()>,
}

/// Raw query-string shape for `/auth/:domain`. `identity` is kept as
/// an optional `String` rather than `Uuid` so a missing or malformed
/// value reaches the handler instead of failing extraction outright --
/// the handler turns either case into an enveloped `ApiError::InputInvalid`
/// (spec.md §6: "400 empty identity" must still get `{error:{msg,code}}`).
#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub identity: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub connection: ConnectionInfo,
    pub error: Option<()>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub port: u16,
    pub gk: GatekeeperMeta,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub time: String,
}
