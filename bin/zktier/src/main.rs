//! # zktier
//!
//! `zktier` is a binary crate for a command line application that inspects the networks known to
//! the harness and follows transactions through the zkEVM finality tiers.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod network;
use network::Network;

mod watch;
use watch::Watch;

#[derive(Debug, Parser)]
#[clap(about, version)]
struct Cli {
    #[clap(subcommand)]
    command: Subcommands,
}

#[derive(Debug, Subcommand)]
enum Subcommands {
    /// Inspect embedded and dynamically configured networks.
    Network(Network),
    /// Wait for an already submitted transaction to reach a confirmation tier.
    Watch(Watch),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,zktier=debug,zktier_core=debug");
    }
    env_logger::init();

    match cli.command {
        Subcommands::Network(cmd) => cmd.run(),
        Subcommands::Watch(cmd) => cmd.run().await,
    }
}
