//! Registration HTTP client (§4.E item 2), grounded on
//! `original_source/pkg/agent/register.go`'s `registerRequest` and the
//! teacher's `reqwest`-based Galaxy client idiom
//! (`galaxy::client::GalaxyClient`) for status-code handling.

use std::path::Path;

use reqwest::StatusCode;
use tracing::{debug, info};

use uuid::Uuid;

use crate::api::types::{AuthResponse, ConnectionInfo, RegisterResponse};
use crate::identity::AgentCredentials;
use crate::util::split_domain_request;

use super::error::AgentError;
use super::fs::persist_identity;

/// POST `/register/:sub` against the control plane serving `fqdn`'s
/// root domain, embed the local `host`/`port` as PEM carrier headers,
/// and persist the identity under `<root>/identities/`.
pub async fn register_host(
    client: &reqwest::Client,
    api_port: u16,
    root_directory: &Path,
    fqdn: &str,
    host: &str,
    port: u16,
) -> Result<AgentCredentials, AgentError> {
    let (sub, root_domain) = split_domain_request(fqdn);
    let url = format!("http://{root_domain}:{api_port}/register/{sub}");

    debug!(%fqdn, %url, "registering identity with control plane");
    let response = client
        .post(&url)
        .send()
        .await
        .map_err(|e| AgentError::Register {
            url: url.clone(),
            message: e.to_string(),
        })?;

    if response.status() != StatusCode::OK {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AgentError::RegisterRejected {
            domain: fqdn.to_string(),
            message: format!("{status}: {body}"),
        });
    }

    let body: RegisterResponse = response.json().await.map_err(|e| AgentError::Register {
        url,
        message: e.to_string(),
    })?;
    if body.error.is_some() {
        return Err(AgentError::RegisterRejected {
            domain: fqdn.to_string(),
            message: "control plane reported an error with no message".to_string(),
        });
    }

    let creds = AgentCredentials::from_wire(body.agent_id)?;
    let key = creds.private_rsa_key()?;
    let creds = creds.with_embedded_headers(&key, host, port)?;
    persist_identity(root_directory, fqdn, &creds)?;
    info!(%fqdn, "persisted credentials to disk");
    Ok(creds)
}

/// POST `/auth/:sub?identity=<uid>`, returning the assigned slot port
/// and gatekeeper connection metadata (spec.md §9 Open Question 2: the
/// agent always dials using the port `/auth` returns, never a
/// hardcoded one).
pub async fn fetch_auth(
    client: &reqwest::Client,
    api_port: u16,
    fqdn: &str,
    identity: Uuid,
) -> Result<ConnectionInfo, AgentError> {
    let (sub, root_domain) = split_domain_request(fqdn);
    let url = format!("http://{root_domain}:{api_port}/auth/{sub}?identity={identity}");

    let response = client
        .post(&url)
        .send()
        .await
        .map_err(|e| AgentError::Register {
            url: url.clone(),
            message: e.to_string(),
        })?;

    if response.status() != StatusCode::OK {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AgentError::RegisterRejected {
            domain: fqdn.to_string(),
            message: format!("{status}: {body}"),
        });
    }

    let body: AuthResponse = response.json().await.map_err(|e| AgentError::Register {
        url,
        message: e.to_string(),
    })?;
    if body.error.is_some() {
        return Err(AgentError::RegisterRejected {
            domain: fqdn.to_string(),
            message: "control plane reported an auth error with no message".to_string(),
        });
    }
    Ok(body.connection)
}
