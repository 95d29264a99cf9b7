//! Host key persistence (§4.D item 3): load from file, or generate a
//! fresh RSA-2048 key and persist it, mode 0600.

use std::path::Path;

use crate::identity::codec;
use crate::util::write_file_with_mode;

use super::error::GatekeeperError;

/// Load the host key at `path`, generating and persisting a new
/// RSA-2048 key if the file doesn't exist yet.
pub fn load_or_generate(path: &Path) -> Result<rsa::RsaPrivateKey, GatekeeperError> {
    if path.exists() {
        let pem = std::fs::read_to_string(path)?;
        let (key, _headers) = codec::decode_private_key_pem(&pem)?;
        return Ok(key);
    }
    let key = codec::generate_keypair()?;
    let pem = codec::encode_private_key_pem(&key, &[])?;
    write_file_with_mode(path, pem.as_bytes(), 0o600)?;
    Ok(key)
}

/// Wrap a generated/loaded RSA host key as a russh key pair.
///
/// `russh_keys`' `KeyPair::RSA` variant is built directly on the `rsa`
/// crate's `RsaPrivateKey` (the same reason `identity::codec` generates
/// keys with that crate), so this is a direct wrap, not a conversion.
pub fn to_russh_keypair(key: rsa::RsaPrivateKey) -> russh::keys::key::KeyPair {
    russh::keys::key::KeyPair::RSA {
        key,
        hash: russh::keys::key::SignatureHash::SHA2_256,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_reloads_host_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.key");
        let first = load_or_generate(&path).unwrap();
        let second = load_or_generate(&path).unwrap();
        use rsa::pkcs1::EncodeRsaPrivateKey;
        assert_eq!(
            first.to_pkcs1_der().unwrap().as_bytes(),
            second.to_pkcs1_der().unwrap().as_bytes()
        );
    }
}
