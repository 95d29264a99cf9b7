//! On-disk identity layout (§4.E items 1 and 3), grounded on
//! `original_source/pkg/agent/fs.go`'s `ensureRSSHDirectories` and the
//! credential files it writes under `<root>/identities/`.

use std::collections::HashSet;
use std::path::Path;

use tracing::warn;
use uuid::Uuid;

use crate::identity::{codec, AgentCredentials};
use crate::util::{ensure_dir_with_mode, write_file_with_mode};

use super::error::AgentError;
use super::ForwardedHost;

const ROOT_MODE: u32 = 0o744;
const IDENTITIES_MODE: u32 = 0o700;
const PRIVATE_KEY_MODE: u32 = 0o600;
const PUBLIC_KEY_MODE: u32 = 0o644;

pub fn identities_dir(root: &Path) -> std::path::PathBuf {
    root.join("identities")
}

/// Append `.pub` to a whole identity filename. Not `Path::with_extension`:
/// for a multi-label FQDN like `id_rsa.demo.example.com`,
/// `with_extension` replaces the last dotted segment instead of
/// appending, truncating the domain.
pub fn public_key_path(private_key_path: &Path) -> std::path::PathBuf {
    let file_name = private_key_path
        .file_name()
        .expect("identity path always has a file name")
        .to_string_lossy();
    private_key_path.with_file_name(format!("{file_name}.pub"))
}

/// Create `<root>/` (0744) and `<root>/identities/` (0700) if absent.
pub fn ensure_directories(root: &Path) -> Result<(), AgentError> {
    ensure_dir_with_mode(root, ROOT_MODE)?;
    ensure_dir_with_mode(&identities_dir(root), IDENTITIES_MODE)?;
    Ok(())
}

/// Persist a freshly registered identity as
/// `<root>/identities/id_rsa.<fqdn>[.pub]`.
pub fn persist_identity(root: &Path, fqdn: &str, creds: &AgentCredentials) -> Result<(), AgentError> {
    let dir = identities_dir(root);
    let key_path = dir.join(format!("id_rsa.{fqdn}"));
    let private_pem = creds
        .private_key
        .as_deref()
        .ok_or_else(|| AgentError::Internal("credentials missing private key material".into()))?;
    write_file_with_mode(&key_path, private_pem.as_bytes(), PRIVATE_KEY_MODE)?;
    write_file_with_mode(
        &public_key_path(&key_path),
        creds.public_key.as_bytes(),
        PUBLIC_KEY_MODE,
    )?;
    Ok(())
}

/// Enumerate `<root>/identities/`, parse every private key (skipping
/// `.pub` companions), and dedupe on `uid` (§4.E item 3).
pub fn import_identities(root: &Path) -> Result<Vec<ForwardedHost>, AgentError> {
    let dir = identities_dir(root);
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(hosts),
        Err(e) => return Err(AgentError::Io(e)),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map(|ext| ext == "pub").unwrap_or(false) {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(domain) = file_name.strip_prefix("id_rsa.") else {
            continue;
        };

        match load_identity(&path, domain) {
            Ok(host) => {
                if seen.insert(host.uid) {
                    hosts.push(host);
                } else {
                    warn!(domain = %domain, uid = %host.uid, "duplicate identity uid, skipping");
                }
            }
            Err(e) => warn!(domain = %domain, error = %e, "failed to import identity, skipping"),
        }
    }

    Ok(hosts)
}

fn load_identity(path: &Path, domain: &str) -> Result<ForwardedHost, AgentError> {
    let pem = std::fs::read_to_string(path)?;
    let (_key, headers) = codec::decode_private_key_pem(&pem)?;

    let uid: Uuid = headers
        .get("uid")
        .ok_or_else(|| AgentError::Internal(format!("{domain}: missing uid header")))?
        .parse()
        .map_err(|_| AgentError::Internal(format!("{domain}: uid header is not a uuid")))?;
    let host = headers
        .get("host")
        .ok_or_else(|| AgentError::Internal(format!("{domain}: missing host header")))?
        .clone();
    let port: u16 = headers
        .get("port")
        .ok_or_else(|| AgentError::Internal(format!("{domain}: missing port header")))?
        .parse()
        .map_err(|_| AgentError::Internal(format!("{domain}: port header is not a u16")))?;

    let public_key = std::fs::read_to_string(public_key_path(path))?;

    Ok(ForwardedHost {
        domain: domain.to_string(),
        host,
        port,
        uid,
        credentials: AgentCredentials {
            id: uid,
            public_key: public_key.trim().to_string(),
            private_key: Some(pem),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_directories_sets_requested_modes() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("rssh");
        ensure_directories(&root).unwrap();
        assert_eq!(
            std::fs::metadata(&root).unwrap().permissions().mode() & 0o777,
            ROOT_MODE
        );
        assert_eq!(
            std::fs::metadata(identities_dir(&root)).unwrap().permissions().mode() & 0o777,
            IDENTITIES_MODE
        );
    }

    #[test]
    fn persist_then_import_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        ensure_directories(&root).unwrap();

        let (creds, key) = AgentCredentials::generate("rssh-agent").unwrap();
        let creds = creds.with_embedded_headers(&key, "127.0.0.1", 2222).unwrap();
        persist_identity(&root, "demo.example.com", &creds).unwrap();

        let hosts = import_identities(&root).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].domain, "demo.example.com");
        assert_eq!(hosts[0].host, "127.0.0.1");
        assert_eq!(hosts[0].port, 2222);
        assert_eq!(hosts[0].uid, creds.id);
    }

    #[test]
    fn public_key_file_keeps_the_full_fqdn() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        ensure_directories(&root).unwrap();

        let (creds, key) = AgentCredentials::generate("rssh-agent").unwrap();
        let creds = creds.with_embedded_headers(&key, "127.0.0.1", 2222).unwrap();
        persist_identity(&root, "demo.example.com", &creds).unwrap();

        let expected = identities_dir(&root).join("id_rsa.demo.example.com.pub");
        assert!(expected.exists(), "expected {expected:?} to exist");
    }

    #[test]
    fn import_dedupes_on_uid() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        ensure_directories(&root).unwrap();

        let (creds, key) = AgentCredentials::generate("rssh-agent").unwrap();
        let creds = creds.with_embedded_headers(&key, "127.0.0.1", 2222).unwrap();
        persist_identity(&root, "demo.example.com", &creds).unwrap();
        persist_identity(&root, "demo-alias.example.com", &creds).unwrap();

        let hosts = import_identities(&root).unwrap();
        assert_eq!(hosts.len(), 1);
    }
}
