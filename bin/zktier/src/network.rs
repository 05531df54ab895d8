use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use zktier_core::network::{NetworkIdentifier, NetworkRegistry, RegistryConfig};

#[derive(Debug, Parser)]
pub struct Network {
    #[clap(subcommand)]
    command: Subcommands,
    /// Directory holding `dynamic-configs/<name>-chainspec.json` files
    #[clap(long, env = "ZKTIER_CONFIG_ROOT", global = true)]
    config_root: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Subcommands {
    /// List the networks compiled into the binary.
    List,
    /// Print the descriptor of a network given by name or genesis hash.
    Resolve(Resolve),
}

#[derive(Debug, Parser)]
struct Resolve {
    /// Network name, or `0x`-prefixed genesis hash
    identifier: NetworkIdentifier,
}

impl Network {
    pub fn run(self) -> Result<()> {
        let registry = NetworkRegistry::new(RegistryConfig {
            config_root: self.config_root,
        })?;

        match self.command {
            Subcommands::List => {
                for name in registry.known_networks() {
                    let descriptor = registry.resolve_name(name)?;
                    match descriptor.genesis_hash {
                        Some(hash) => println!("{:<16} {:>6}  {}", name, descriptor.chain_id, hash),
                        None => println!("{:<16} {:>6}", name, descriptor.chain_id),
                    }
                }
            }
            Subcommands::Resolve(resolve) => {
                let descriptor = registry.resolve(&resolve.identifier)?;
                println!("{}", serde_json::to_string_pretty(&*descriptor)?);
            }
        }

        Ok(())
    }
}
