//! Subcommand implementations, one module per `Commands` variant.

pub mod agent;
pub mod gatekeeper;
pub mod server;
