//! `rssh agent {register,ls,rm,connect}` (§4.E), flags grounded on
//! `original_source/cmd/agent/{register,ls,rm}/*.go`'s cobra commands:
//! `register` takes `-d/--domain`, `-a/--host` (default 127.0.0.1),
//! `-p/--port` (default 22).

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{error, info};

use crate::agent::Agent;
use crate::config::Config;

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    #[command(subcommand)]
    pub command: AgentSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AgentSubcommand {
    /// Register a new endpoint to expose.
    Register(RegisterArgs),

    /// List imported identities.
    Ls(LsArgs),

    /// Remove an identity by domain.
    Rm(RmArgs),

    /// Import identities and hold reverse forwards open.
    Connect(ConnectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Domain to register (including the configured root domain).
    #[arg(short = 'd', long)]
    pub domain: String,

    /// Local host to expose through the agent.
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Local port to expose through the agent.
    #[arg(short = 'p', long, default_value_t = 22)]
    pub port: u16,
}

#[derive(Args, Debug, Clone)]
pub struct LsArgs;

#[derive(Args, Debug, Clone)]
pub struct RmArgs {
    /// Domains to remove.
    #[arg(required = true)]
    pub domains: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs;

impl AgentArgs {
    pub async fn execute(&self, config: Config) -> Result<()> {
        let agent = Agent::new(config.agent);
        match &self.command {
            AgentSubcommand::Register(args) => {
                agent
                    .register(&args.domain, &args.host, args.port)
                    .await
                    .context("registration failed")?;
                info!(domain = %args.domain, "persisted credentials to disk");
                Ok(())
            }
            AgentSubcommand::Ls(_) => {
                let hosts = agent.list_identities().context("failed to list identities")?;
                println!("|{}|", "-".repeat(1 + 36 * 2));
                println!("| {:<36} | {:<36} |", "Domain", "UID");
                println!("|{}|", "-".repeat(1 + 36 * 2));
                for host in hosts {
                    println!("| {:<36} | {:<36} |", host.domain, host.uid);
                }
                println!("|{}|", "-".repeat(1 + 36 * 2));
                Ok(())
            }
            AgentSubcommand::Rm(args) => {
                for domain in &args.domains {
                    match agent.remove_identity(domain) {
                        Ok(()) => info!(domain, "identity removed"),
                        Err(e) => error!(domain, error = %e, "could not remove identity"),
                    }
                }
                Ok(())
            }
            AgentSubcommand::Connect(_) => agent.run().await.context("agent connect loop exited with an error"),
        }
    }
}
