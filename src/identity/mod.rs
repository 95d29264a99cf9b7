//! Identity codec (§3, §4.B): agent key pairs, the wire/JSON encoding of
//! [`AgentCredentials`], and [`DomainRecord`], the form persisted at
//! `/domains/{sub}` with the private half stripped.

pub mod codec;
pub mod error;

pub use error::IdentityError;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The SSH user agents authenticate as against the gatekeeper.
pub const GATEKEEPER_SSH_USER: &str = "rssh_agent";

/// `{id, publicKey, privateKey}` from spec.md §3. `private_key` is the
/// PEM-with-headers encoding from [`codec`]; it is `None` once an
/// `AgentCredentials` has been downgraded into a [`DomainRecord`].
#[derive(Debug, Clone)]
pub struct AgentCredentials {
    pub id: Uuid,
    /// OpenSSH `authorized_keys` line.
    pub public_key: String,
    /// PEM private key, present only until persisted/stripped.
    pub private_key: Option<String>,
}

/// The JSON wire shape: `{aid, public_key, private_key}`, both key
/// blobs base64-encoded, matching spec.md §3/§6 exactly.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentCredentialsWire {
    pub aid: Uuid,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl AgentCredentials {
    /// Generate a fresh RSA-2048 identity. `comment` becomes the
    /// trailing comment field of the OpenSSH public key line.
    pub fn generate(comment: &str) -> Result<(Self, RsaPrivateKey), IdentityError> {
        let key = codec::generate_keypair()?;
        let public_key = codec::encode_openssh_public_key(&key.to_public_key(), comment);
        let private_pem = codec::encode_private_key_pem(&key, &[])?;
        Ok((
            Self {
                id: Uuid::new_v4(),
                public_key,
                private_key: Some(private_pem),
            },
            key,
        ))
    }

    /// Re-encode the private key PEM with the `uid`/`host`/`port`
    /// carrier headers the agent needs to recover its forwarding
    /// target on restart (§4.E item 2).
    pub fn with_embedded_headers(
        &self,
        key: &RsaPrivateKey,
        host: &str,
        port: u16,
    ) -> Result<Self, IdentityError> {
        let pem = codec::encode_private_key_pem(
            key,
            &[
                ("uid", &self.id.to_string()),
                ("host", host),
                ("port", &port.to_string()),
            ],
        )?;
        Ok(Self {
            id: self.id,
            public_key: self.public_key.clone(),
            private_key: Some(pem),
        })
    }

    /// Strip the private half, producing the form written to
    /// `/domains/{sub}`.
    pub fn into_domain_record(mut self) -> DomainRecord {
        self.private_key = None;
        DomainRecord(self)
    }

    pub fn to_wire(&self) -> AgentCredentialsWire {
        AgentCredentialsWire {
            aid: self.id,
            public_key: BASE64.encode(&self.public_key),
            private_key: self.private_key.as_ref().map(|pem| BASE64.encode(pem)),
        }
    }

    pub fn from_wire(wire: AgentCredentialsWire) -> Result<Self, IdentityError> {
        let public_key = String::from_utf8(
            BASE64
                .decode(wire.public_key)
                .map_err(|e| IdentityError::PublicKey(e.to_string()))?,
        )
        .map_err(|e| IdentityError::PublicKey(e.to_string()))?;
        let private_key = wire
            .private_key
            .map(|b64| -> Result<String, IdentityError> {
                let bytes = BASE64.decode(b64).map_err(|e| IdentityError::Pem(e.to_string()))?;
                String::from_utf8(bytes).map_err(|e| IdentityError::Pem(e.to_string()))
            })
            .transpose()?;
        Ok(Self {
            id: wire.aid,
            public_key,
            private_key,
        })
    }

    /// Parse the stored private key's DER back into an `RsaPrivateKey`,
    /// for use as the SSH auth key.
    pub fn private_rsa_key(&self) -> Result<RsaPrivateKey, IdentityError> {
        let pem = self
            .private_key
            .as_ref()
            .ok_or_else(|| IdentityError::Pem("no private key material".into()))?;
        let (key, _headers) = codec::decode_private_key_pem(pem)?;
        Ok(key)
    }
}

/// `/domains/{sub}` record: an `AgentCredentials` whose `private_key`
/// is always absent, by construction.
#[derive(Debug, Clone)]
pub struct DomainRecord(AgentCredentials);

impl DomainRecord {
    pub fn credentials(&self) -> &AgentCredentials {
        &self.0
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.0.to_wire())
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, IdentityError> {
        let wire: AgentCredentialsWire =
            serde_json::from_slice(bytes).map_err(|e| IdentityError::Pem(e.to_string()))?;
        let mut creds = AgentCredentials::from_wire(wire)?;
        creds.private_key = None;
        Ok(Self(creds))
    }
}

/// Load an `RsaPrivateKey` out of a decoded PEM's DER body directly
/// (used by the gatekeeper host-key loader, which doesn't need the
/// carrier-header machinery).
pub fn decode_bare_pkcs1_der(der: &[u8]) -> Result<RsaPrivateKey, IdentityError> {
    RsaPrivateKey::from_pkcs1_der(der).map_err(|e| IdentityError::Pem(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_matching_public_and_private_halves() {
        let (creds, key) = AgentCredentials::generate("rssh-agent").unwrap();
        assert!(creds.public_key.starts_with("ssh-rsa "));
        let parsed = creds.private_rsa_key().unwrap();
        assert_eq!(
            parsed.to_pkcs1_der().unwrap().as_bytes(),
            {
                use rsa::pkcs1::EncodeRsaPrivateKey;
                key.to_pkcs1_der().unwrap().as_bytes().to_vec()
            }
            .as_slice()
        );
    }

    #[test]
    fn wire_round_trip_preserves_fields() {
        let (creds, _key) = AgentCredentials::generate("rssh-agent").unwrap();
        let wire = creds.to_wire();
        let back = AgentCredentials::from_wire(wire).unwrap();
        assert_eq!(back.id, creds.id);
        assert_eq!(back.public_key, creds.public_key);
        assert_eq!(back.private_key, creds.private_key);
    }

    #[test]
    fn domain_record_strips_private_key() {
        let (creds, _key) = AgentCredentials::generate("rssh-agent").unwrap();
        let id = creds.id;
        let record = creds.into_domain_record();
        assert_eq!(record.id(), id);
        assert!(record.credentials().private_key.is_none());

        let bytes = record.to_json().unwrap();
        let restored = DomainRecord::from_json(&bytes).unwrap();
        assert_eq!(restored.id(), id);
        assert!(restored.credentials().private_key.is_none());
    }
}
