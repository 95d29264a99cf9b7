//! Layered configuration record (§6): defaults, then an optional TOML
//! file, then `RSSH_`-prefixed environment variables. The core
//! components only ever see the resulting [`Config`]; none of them
//! touch the filesystem or environment directly.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid ssh_port_range {0:?}: expected \"low-high\"")]
    PortRange(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub addr: IpAddr,
    pub port: u16,
    pub domain: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".parse().unwrap(),
            port: 9321,
            domain: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    pub low: u16,
    pub high: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            low: 31240,
            high: 65535,
        }
    }
}

impl std::str::FromStr for PortRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (low, high) = s
            .split_once('-')
            .ok_or_else(|| ConfigError::PortRange(s.to_string()))?;
        let low: u16 = low
            .trim()
            .parse()
            .map_err(|_| ConfigError::PortRange(s.to_string()))?;
        let high: u16 = high
            .trim()
            .parse()
            .map_err(|_| ConfigError::PortRange(s.to_string()))?;
        Ok(Self { low, high })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    pub ssh_addr: IpAddr,
    pub port: u16,
    pub ssh_port_range: PortRange,
    pub ssh_host_key: PathBuf,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            ssh_addr: "0.0.0.0".parse().unwrap(),
            port: 2223,
            ssh_port_range: PortRange::default(),
            ssh_host_key: PathBuf::from(".rssh-gk-host.key"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub root_directory: PathBuf,
    /// Port the control plane listens on, for forming
    /// `http://<rootDomain>:<api_port>/...` registration/auth URLs.
    pub api_port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            root_directory: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".rssh"),
            api_port: 9321,
        }
    }
}

/// The full configuration record, per spec.md §6's table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub gatekeeper: GatekeeperConfig,
    pub etcd: EtcdConfig,
    pub agent: AgentConfig,
}

impl Config {
    /// Build a `Config` by layering defaults, an optional TOML file,
    /// then `RSSH_`-prefixed environment variables, in that order.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match file {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides(std::env::vars())?;
        Ok(cfg)
    }

    fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `RSSH_SECTION_FIELD` overrides (e.g. `RSSH_API_PORT=9000`,
    /// `RSSH_GATEKEEPER_SSH_PORT_RANGE=20000-30000`) on top of an
    /// already-loaded config.
    fn apply_env_overrides(
        &mut self,
        vars: impl Iterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix("RSSH_") else {
                continue;
            };
            let field = rest.to_ascii_lowercase();
            self.apply_one_override(&field, &key, &value)?;
        }
        Ok(())
    }

    fn apply_one_override(&mut self, field: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let bad = |reason: &str| ConfigError::EnvOverride {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };
        match field {
            "api_addr" => self.api.addr = value.parse().map_err(|_| bad("not an IP address"))?,
            "api_port" => self.api.port = value.parse().map_err(|_| bad("not a u16"))?,
            "api_domain" => self.api.domain = value.to_string(),
            "gatekeeper_ssh_addr" => {
                self.gatekeeper.ssh_addr = value.parse().map_err(|_| bad("not an IP address"))?
            }
            "gatekeeper_port" => {
                self.gatekeeper.port = value.parse().map_err(|_| bad("not a u16"))?
            }
            "gatekeeper_ssh_port_range" => {
                self.gatekeeper.ssh_port_range = value.parse()?
            }
            "gatekeeper_ssh_host_key" => self.gatekeeper.ssh_host_key = PathBuf::from(value),
            "etcd_endpoints" => {
                self.etcd.endpoints = value.split(',').map(|s| s.trim().to_string()).collect()
            }
            "agent_root_directory" => self.agent.root_directory = PathBuf::from(value),
            "agent_api_port" => self.agent.api_port = value.parse().map_err(|_| bad("not a u16"))?,
            _ => {} // unrecognized RSSH_* var: ignore rather than fail startup
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config::default();
        assert_eq!(cfg.api.port, 9321);
        assert_eq!(cfg.gatekeeper.port, 2223);
        assert_eq!(cfg.gatekeeper.ssh_port_range, PortRange { low: 31240, high: 65535 });
        assert_eq!(cfg.etcd.endpoints, vec!["http://127.0.0.1:2379"]);
        assert!(cfg.agent.root_directory.ends_with(".rssh"));
    }

    #[test]
    fn port_range_parses_low_high() {
        let r: PortRange = "20000-30000".parse().unwrap();
        assert_eq!(r, PortRange { low: 20000, high: 30000 });
        assert!("bogus".parse::<PortRange>().is_err());
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        let mut cfg = Config::default();
        cfg.apply_env_overrides(
            vec![
                ("RSSH_API_PORT".to_string(), "9000".to_string()),
                ("RSSH_API_DOMAIN".to_string(), "example.com".to_string()),
                ("UNRELATED".to_string(), "ignored".to_string()),
            ]
            .into_iter(),
        )
        .unwrap();
        assert_eq!(cfg.api.port, 9000);
        assert_eq!(cfg.api.domain, "example.com");
    }
}
