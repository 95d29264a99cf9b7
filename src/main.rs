//! Entry point: parse arguments, initialize logging, load configuration,
//! and dispatch to the selected subcommand.

use anyhow::Result;
use rssh::cli::{Cli, Commands};
use rssh::config::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbosity());

    let config = Config::load(cli.config.as_ref()).unwrap_or_else(|e| {
        eprintln!("warning: failed to load config, using defaults: {e}");
        Config::default()
    });

    match &cli.command {
        Commands::Server(args) => args.execute(config).await,
        Commands::Gatekeeper(args) => args.execute(config).await,
        Commands::Agent(args) => args.execute(config).await,
        Commands::Version => {
            println!("rssh {}", rssh::version());
            Ok(())
        }
    }
}

fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
