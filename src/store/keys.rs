//! Canonical key paths (§6 "Store layout"). Centralized so no caller
//! hand-formats a `/gatekeeper/slotfs/{port}` string independently (the
//! Go original scattered `fmt.Sprintf` calls across `pkg/gatekeeper` and
//! `pkg/server` that could drift from each other).

pub const SLOTFS_PREFIX: &str = "/gatekeeper/slotfs/";
pub const DOMAINS_PREFIX: &str = "/domains/";
pub const AGENTS_PREFIX: &str = "/agents/";
pub const API_META_KEY: &str = "/meta/api";
pub const GATEKEEPER_META_KEY: &str = "/meta/gatekeeper";

pub fn domain_key(sub: &str) -> String {
    format!("{DOMAINS_PREFIX}{sub}")
}

pub fn agent_key(uuid: &str) -> String {
    format!("{AGENTS_PREFIX}{uuid}")
}

pub fn slot_key(port: u16) -> String {
    format!("{SLOTFS_PREFIX}{port}")
}

/// Parse the trailing port segment of a slotfs key. Returns `None` for
/// any key that isn't a direct child of `/gatekeeper/slotfs/` or whose
/// tail doesn't parse as `u16` -- gap detection must never fall back to
/// lexicographic string ordering (spec §9, Open Question 4).
pub fn port_from_slot_key(key: &str) -> Option<u16> {
    key.strip_prefix(SLOTFS_PREFIX)?.parse().ok()
}
