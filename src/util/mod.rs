//! Shared helpers used by every other component: domain validation, the
//! fixed-interval retry loop, port min/max, and a local-bind port scan.
//!
//! None of this is stateful; it exists so the control plane, gatekeeper
//! and agent don't each reimplement the same regex or backoff loop.

pub mod retry;

use once_cell::sync::Lazy;
use regex::Regex;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Matches a bare subdomain leaf: the part of the FQDN before the root
/// domain, e.g. `demo` in `demo.example.com`.
static SUBDOMAIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Root domain validator, taken verbatim from spec: permissive enough to
/// accept `.localhost`-style TLDs used in development.
static ROOT_DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(([A-Za-z]{1,2})|([A-Za-z][0-9])|([0-9][A-Za-z])|([A-Za-z0-9][A-Za-z0-9\-_]{1,61}[A-Za-z0-9]))\.([A-Za-z]{2,6}|[A-Za-z0-9\-]{2,30})$",
    )
    .unwrap()
});

/// Validate a subdomain leaf (the route parameter in `/register/:domain`
/// and `/auth/:domain`). Only alphanumerics are accepted.
pub fn is_valid_subdomain(sub: &str) -> bool {
    SUBDOMAIN_RE.is_match(sub)
}

/// Validate a root domain, e.g. the configured `api.domain`.
pub fn is_valid_root_domain(domain: &str) -> bool {
    ROOT_DOMAIN_RE.is_match(domain)
}

/// Split a fully-qualified domain name into its leading label and the
/// remainder, e.g. `"demo.example.com"` -> `("demo", "example.com")`.
pub fn split_domain_request(fqdn: &str) -> (String, String) {
    let mut parts = fqdn.splitn(2, '.');
    let sub = parts.next().unwrap_or_default().to_string();
    let rest = parts.next().unwrap_or_default().to_string();
    (sub, rest)
}

/// Smallest of two ports.
pub fn min_port(a: u16, b: u16) -> u16 {
    a.min(b)
}

/// Largest of two ports.
pub fn max_port(a: u16, b: u16) -> u16 {
    a.max(b)
}

/// Probe `127.0.0.1` for the lowest free TCP port in `[low, high]`.
///
/// This is a local allocation hint only (used by the agent when no
/// control-plane slot is relevant yet); slot allocation for the
/// gatekeeper always goes through the store, never through this probe.
pub async fn find_available_port(low: u16, high: u16) -> Option<u16> {
    for port in low..=high {
        if tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .is_ok()
        {
            return Some(port);
        }
    }
    None
}

/// Create `dir` (and parents) if missing, then set its mode explicitly
/// -- `create_dir_all` doesn't honor a requested mode on an
/// already-existing directory, and depending on umask a fresh one may
/// not get it either.
pub fn ensure_dir_with_mode(dir: &Path, mode: u32) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(mode))
}

/// Write `contents` to `path`, then set its mode explicitly (used for
/// identity and host-key files, which must not be group/world
/// readable).
pub fn write_file_with_mode(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    std::fs::write(path, contents)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_validation() {
        assert!(is_valid_subdomain("demo"));
        assert!(is_valid_subdomain("Demo123"));
        assert!(!is_valid_subdomain("demo.sub"));
        assert!(!is_valid_subdomain("demo-sub"));
        assert!(!is_valid_subdomain(""));
    }

    #[test]
    fn root_domain_validation() {
        assert!(is_valid_root_domain("example.com"));
        assert!(is_valid_root_domain("my-root_domain.io"));
        assert!(!is_valid_root_domain("not a domain"));
    }

    #[test]
    fn split_domain() {
        assert_eq!(
            split_domain_request("demo.example.com"),
            ("demo".to_string(), "example.com".to_string())
        );
        assert_eq!(
            split_domain_request("demo"),
            ("demo".to_string(), "".to_string())
        );
    }

    #[test]
    fn minmax() {
        assert_eq!(min_port(10, 5), 5);
        assert_eq!(max_port(10, 5), 10);
    }

    #[tokio::test]
    async fn finds_available_port() {
        let port = find_available_port(20000, 20010).await;
        assert!(port.is_some());
    }

    #[test]
    fn file_mode_helpers_set_requested_mode() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("identities");
        ensure_dir_with_mode(&sub, 0o700).unwrap();
        let meta = std::fs::metadata(&sub).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);

        let file = sub.join("id_rsa.demo");
        write_file_with_mode(&file, b"pem", 0o600).unwrap();
        let meta = std::fs::metadata(&file).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
