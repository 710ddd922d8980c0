//! CLI command definitions and dispatch.

mod alias;
mod generate;
mod merge;
mod order;
mod scaffold;
mod shell;
mod transfer;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stratum — declarative multi-image container build planner.
#[derive(Parser)]
#[command(name = "stratum", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Plan the fleet and write Containerfiles and docker-bake.hcl
    Generate(generate::GenerateArgs),
    /// Print the resolved image build order
    Order(order::OrderArgs),
    /// Merge adjacent layers of a built image under a size cap
    Merge(merge::MergeArgs),
    /// Create a new layer skeleton
    Scaffold(scaffold::ScaffoldArgs),
    /// Manage command-alias scripts
    #[command(subcommand)]
    Alias(alias::AliasCommand),
    /// Copy an image between container engines
    Transfer(transfer::TransferArgs),
    /// Run a shell (or a command) in a fleet image
    Shell(shell::ShellArgs),
}

/// Default bin directory for installed alias scripts (~/.local/bin).
pub(crate) fn alias_bin_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".local"))
        .unwrap_or_else(|| PathBuf::from(".local"))
        .join("bin")
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Generate(args) => generate::execute(args),
        Command::Order(args) => order::execute(args),
        Command::Merge(args) => merge::execute(args),
        Command::Scaffold(args) => scaffold::execute(args),
        Command::Alias(command) => alias::execute(command),
        Command::Transfer(args) => transfer::execute(args),
        Command::Shell(args) => shell::execute(args),
    }
}
