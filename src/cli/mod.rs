//! Command-line surface, grounded on the teacher's `cli::{Cli, Commands}`
//! shape (`clap::Parser`/`Subcommand`, global `-v`/`-c` flags) trimmed to
//! the five subcommands spec.md §2 names.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "rssh")]
#[command(author = "rssh contributors")]
#[command(version)]
#[command(about = "Expose TCP services behind NAT through a public SSH jump host", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML configuration file.
    #[arg(short = 'c', long, global = true, env = "RSSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the control-plane coordinator.
    Server(commands::server::ServerArgs),

    /// Run the gatekeeper SSH server.
    Gatekeeper(commands::gatekeeper::GatekeeperArgs),

    /// Agent identity and connection management.
    Agent(commands::agent::AgentArgs),

    /// Print version information.
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_subcommand() {
        let cli = Cli::try_parse_from(["rssh", "server"]).unwrap();
        assert!(matches!(cli.command, Commands::Server(_)));
    }

    #[test]
    fn parses_agent_register_subcommand() {
        let cli = Cli::try_parse_from([
            "rssh", "agent", "register", "-d", "demo.example.com", "-a", "127.0.0.1", "-p", "22",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Agent(_)));
    }
}
