use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy_primitives::{b256, B256};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{Error, InitializationError, Result},
    network::{Chainspec, NetworkDescriptor, NetworkIdentifier},
};

/// Sub-directory of the configuration root holding dynamically provided chainspecs.
const DYNAMIC_CONFIGS_DIR: &str = "dynamic-configs";

/// A network compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StaticNetwork {
    pub name: &'static str,
    pub genesis_hash: Option<B256>,
    pub chainspec: &'static str,
}

const STATIC_NETWORKS: &[StaticNetwork] = &[
    StaticNetwork {
        name: "mainnet",
        genesis_hash: Some(b256!(
            "d4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3"
        )),
        chainspec: include_str!("chainspecs/mainnet.json"),
    },
    StaticNetwork {
        name: "sepolia",
        genesis_hash: Some(b256!(
            "25a5cc106eea7138acab33231d7160d69cb777ee0c2c553fcddf5138993e6dd9"
        )),
        chainspec: include_str!("chainspecs/sepolia.json"),
    },
    StaticNetwork {
        name: "goerli",
        genesis_hash: Some(b256!(
            "bf7e331f7f7c1dd2e05159666b3bf8bc7a8a3a9eb1d518969eab529dd9b88c1a"
        )),
        chainspec: include_str!("chainspecs/goerli.json"),
    },
    StaticNetwork {
        name: "holesky",
        genesis_hash: Some(b256!(
            "b5f7f912443c940f21fd611f12828d75b534364ed9e95ca4e307729a4661bde4"
        )),
        chainspec: include_str!("chainspecs/holesky.json"),
    },
    StaticNetwork {
        name: "hermez-mainnet",
        genesis_hash: None,
        chainspec: include_str!("chainspecs/hermez-mainnet.json"),
    },
    StaticNetwork {
        name: "hermez-cardona",
        genesis_hash: None,
        chainspec: include_str!("chainspecs/hermez-cardona.json"),
    },
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root of the per-user configuration directory. Dynamic chainspecs are looked up under
    /// `<config_root>/dynamic-configs/<name>-chainspec.json`. Without it only embedded networks
    /// resolve.
    #[serde(default)]
    pub config_root: Option<PathBuf>,
}

/// Immutable lookup table from network names and genesis hashes to [`NetworkDescriptor`]s.
///
/// Built once at startup and shared by reference; lookups never mutate it. Names unknown to the
/// embedded table are loaded from the dynamic configuration directory on every call, without
/// caching.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    names: Vec<&'static str>,
    by_name: HashMap<String, Arc<NetworkDescriptor>>,
    by_genesis_hash: HashMap<B256, Arc<NetworkDescriptor>>,
    config_root: Option<PathBuf>,
}

impl NetworkRegistry {
    /// Parses the embedded network table.
    ///
    /// Failure means the binary itself is defective; callers are expected to abort.
    pub fn new(config: RegistryConfig) -> Result<Self, InitializationError> {
        Self::from_static(STATIC_NETWORKS, config)
    }

    pub(crate) fn from_static(
        networks: &[StaticNetwork],
        config: RegistryConfig,
    ) -> Result<Self, InitializationError> {
        let mut names = Vec::with_capacity(networks.len());
        let mut by_name = HashMap::with_capacity(networks.len());
        let mut by_genesis_hash: HashMap<B256, Arc<NetworkDescriptor>> = HashMap::new();

        for network in networks {
            let chainspec: Chainspec =
                network
                    .chainspec
                    .parse()
                    .map_err(|err| InitializationError::MalformedChainspec {
                        name: network.name.to_string(),
                        reason: format!("{}", err),
                    })?;

            let genesis_hash = network.genesis_hash;

            let descriptor = Arc::new(NetworkDescriptor {
                name: network.name.to_string(),
                chain_id: chainspec.chain_id,
                genesis_hash,
                parameters: chainspec.parameters,
            });

            if by_name
                .insert(network.name.to_string(), descriptor.clone())
                .is_some()
            {
                return Err(InitializationError::DuplicateName(network.name.to_string()));
            }

            if let Some(hash) = genesis_hash {
                if let Some(existing) = by_genesis_hash.insert(hash, descriptor) {
                    return Err(InitializationError::DuplicateGenesisHash {
                        hash,
                        first: existing.name.clone(),
                        second: network.name.to_string(),
                    });
                }
            }

            names.push(network.name);
        }

        debug!("Network registry initialized with {} embedded networks", names.len());

        Ok(Self {
            names,
            by_name,
            by_genesis_hash,
            config_root: config.config_root,
        })
    }

    /// Names of the embedded networks, in declaration order.
    pub fn known_networks(&self) -> &[&'static str] {
        &self.names
    }

    pub fn resolve(&self, identifier: &NetworkIdentifier) -> Result<Arc<NetworkDescriptor>> {
        match identifier {
            NetworkIdentifier::Name(name) => self.resolve_name(name),
            NetworkIdentifier::GenesisHash(hash) => self.resolve_genesis_hash(hash),
        }
    }

    /// Looks `name` up in the embedded table, then in the dynamic configuration directory.
    pub fn resolve_name(&self, name: &str) -> Result<Arc<NetworkDescriptor>> {
        if let Some(descriptor) = self.by_name.get(name) {
            return Ok(descriptor.clone());
        }

        self.load_dynamic(name).map(Arc::new)
    }

    /// Only embedded networks are indexed by genesis hash.
    pub fn resolve_genesis_hash(&self, hash: &B256) -> Result<Arc<NetworkDescriptor>> {
        self.by_genesis_hash
            .get(hash)
            .cloned()
            .ok_or_else(|| Error::UnknownNetwork(hash.to_string()))
    }

    /// Path a dynamic chainspec for `name` is read from, if a configuration root is set.
    pub fn dynamic_chainspec_path(&self, name: &str) -> Option<PathBuf> {
        self.config_root
            .as_deref()
            .map(|root| dynamic_chainspec_path(root, name))
    }

    fn load_dynamic(&self, name: &str) -> Result<NetworkDescriptor> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(Error::UnknownNetwork(name.to_string()));
        }
        let Some(path) = self.dynamic_chainspec_path(name) else {
            return Err(Error::UnknownNetwork(name.to_string()));
        };

        let document = match std::fs::read_to_string(&path) {
            Ok(document) => document,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No dynamic chainspec for `{}` at {}", name, path.display());
                return Err(Error::UnknownNetwork(name.to_string()));
            }
            Err(source) => return Err(Error::ConfigRead { path, source }),
        };

        let chainspec: Chainspec = document.parse().map_err(|err| Error::ConfigParse {
            path: path.clone(),
            reason: format!("{}", err),
        })?;

        if let Some(chain_name) = chainspec.chain_name.as_deref() {
            if chain_name != name {
                warn!(
                    "Dynamic chainspec {} declares name `{}`, using `{}`",
                    path.display(),
                    chain_name,
                    name
                );
            }
        }
        debug!(
            "Loaded dynamic chainspec for `{}` (chain id {}) from {}",
            name,
            chainspec.chain_id,
            path.display()
        );

        Ok(NetworkDescriptor {
            name: name.to_string(),
            chain_id: chainspec.chain_id,
            genesis_hash: None,
            parameters: chainspec.parameters,
        })
    }
}

fn dynamic_chainspec_path(root: &Path, name: &str) -> PathBuf {
    root.join(DYNAMIC_CONFIGS_DIR)
        .join(format!("{}-chainspec.json", name))
}
