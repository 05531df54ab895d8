use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use alloy_primitives::B256;

mod registry;
pub use registry::{NetworkRegistry, RegistryConfig};

/// Either a network name or the hash of its genesis block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NetworkIdentifier {
    Name(String),
    GenesisHash(B256),
}

impl FromStr for NetworkIdentifier {
    type Err = std::convert::Infallible;

    /// A `0x`-prefixed 32-byte hex string is taken as a genesis hash, anything else as a name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hash = s
            .strip_prefix("0x")
            .filter(|digits| digits.len() == 64)
            .and_then(|_| s.parse::<B256>().ok());
        Ok(match hash {
            Some(hash) => Self::GenesisHash(hash),
            None => Self::Name(s.to_string()),
        })
    }
}

impl From<B256> for NetworkIdentifier {
    fn from(hash: B256) -> Self {
        Self::GenesisHash(hash)
    }
}

impl From<&str> for NetworkIdentifier {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl fmt::Display for NetworkIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::GenesisHash(hash) => write!(f, "{}", hash),
        }
    }
}

/// Everything needed to build and sign valid transactions for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDescriptor {
    pub name: String,
    pub chain_id: u64,
    /// Only known for statically embedded networks.
    pub genesis_hash: Option<B256>,
    pub parameters: ProtocolParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolParameters {
    pub consensus: ConsensusConfig,
    pub forks: ForkSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusKind {
    Ethash,
    Clique,
}

impl fmt::Display for ConsensusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ethash => f.write_str("ethash"),
            Self::Clique => f.write_str("clique"),
        }
    }
}

/// Consensus-specific configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusConfig {
    Ethash,
    Clique(CliqueConfig),
}

impl ConsensusConfig {
    pub fn kind(&self) -> ConsensusKind {
        match self {
            Self::Ethash => ConsensusKind::Ethash,
            Self::Clique(_) => ConsensusKind::Clique,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliqueConfig {
    /// Seconds between blocks.
    pub period: u64,
    /// Blocks after which votes are reset and a checkpoint is taken.
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
struct EthashConfig {}

/// Protocol upgrades, in activation order within each family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fork {
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    MuirGlacier,
    Berlin,
    London,
    ArrowGlacier,
    GrayGlacier,
    ForkId4,
    ForkId5,
    ForkId6,
    ForkId7,
    ForkId8,
    ForkId9,
}

impl Fork {
    /// Base-layer forks in canonical order.
    pub const ETHEREUM: [Self; 12] = [
        Self::Homestead,
        Self::TangerineWhistle,
        Self::SpuriousDragon,
        Self::Byzantium,
        Self::Constantinople,
        Self::Petersburg,
        Self::Istanbul,
        Self::MuirGlacier,
        Self::Berlin,
        Self::London,
        Self::ArrowGlacier,
        Self::GrayGlacier,
    ];

    /// zkEVM fork ids in canonical order.
    pub const ZKEVM: [Self; 6] = [
        Self::ForkId4,
        Self::ForkId5,
        Self::ForkId6,
        Self::ForkId7,
        Self::ForkId8,
        Self::ForkId9,
    ];
}

/// Fork activation block numbers. `None` means the fork is not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homestead_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eip150_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eip155_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byzantium_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constantinople_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub petersburg_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub istanbul_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muir_glacier_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub berlin_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub london_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrow_glacier_block: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gray_glacier_block: Option<u64>,
    #[serde(rename = "forkID4Block", skip_serializing_if = "Option::is_none")]
    pub fork_id4_block: Option<u64>,
    #[serde(rename = "forkID5Block", skip_serializing_if = "Option::is_none")]
    pub fork_id5_block: Option<u64>,
    #[serde(rename = "forkID6Block", skip_serializing_if = "Option::is_none")]
    pub fork_id6_block: Option<u64>,
    #[serde(rename = "forkID7Block", skip_serializing_if = "Option::is_none")]
    pub fork_id7_block: Option<u64>,
    #[serde(rename = "forkID8Block", skip_serializing_if = "Option::is_none")]
    pub fork_id8_block: Option<u64>,
    #[serde(rename = "forkID9Block", skip_serializing_if = "Option::is_none")]
    pub fork_id9_block: Option<u64>,
}

impl ForkSchedule {
    pub fn activation(&self, fork: Fork) -> Option<u64> {
        match fork {
            Fork::Homestead => self.homestead_block,
            Fork::TangerineWhistle => self.eip150_block,
            Fork::SpuriousDragon => self.eip155_block,
            Fork::Byzantium => self.byzantium_block,
            Fork::Constantinople => self.constantinople_block,
            Fork::Petersburg => self.petersburg_block,
            Fork::Istanbul => self.istanbul_block,
            Fork::MuirGlacier => self.muir_glacier_block,
            Fork::Berlin => self.berlin_block,
            Fork::London => self.london_block,
            Fork::ArrowGlacier => self.arrow_glacier_block,
            Fork::GrayGlacier => self.gray_glacier_block,
            Fork::ForkId4 => self.fork_id4_block,
            Fork::ForkId5 => self.fork_id5_block,
            Fork::ForkId6 => self.fork_id6_block,
            Fork::ForkId7 => self.fork_id7_block,
            Fork::ForkId8 => self.fork_id8_block,
            Fork::ForkId9 => self.fork_id9_block,
        }
    }

    pub fn is_active(&self, fork: Fork, block_number: u64) -> bool {
        self.activation(fork)
            .is_some_and(|activation| activation <= block_number)
    }

    /// Scheduled forks within a family must activate in canonical order.
    fn check_order(&self) -> Result<(), ChainspecError> {
        for family in [&Fork::ETHEREUM[..], &Fork::ZKEVM[..]] {
            let mut previous: Option<(Fork, u64)> = None;
            for &fork in family {
                let Some(block) = self.activation(fork) else {
                    continue;
                };
                if let Some((earlier, earlier_block)) = previous {
                    if block < earlier_block {
                        return Err(ChainspecError::ForkOrder {
                            earlier,
                            earlier_block,
                            later: fork,
                            later_block: block,
                        });
                    }
                }
                previous = Some((fork, block));
            }
        }

        Ok(())
    }
}

/// A parsed and validated chainspec document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Chainspec {
    pub chain_name: Option<String>,
    pub chain_id: u64,
    pub parameters: ProtocolParameters,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ChainspecError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("`chainId` must be non-zero")]
    ZeroChainId,
    #[error("consensus is `{0}` but the `{0}` section is missing")]
    MissingConsensusConfig(ConsensusKind),
    #[error("consensus is `{kind}` but a `{section}` section is present")]
    UnexpectedConsensusConfig {
        kind: ConsensusKind,
        section: ConsensusKind,
    },
    #[error("{later:?} (block {later_block}) activates before {earlier:?} (block {earlier_block})")]
    ForkOrder {
        earlier: Fork,
        earlier_block: u64,
        later: Fork,
        later_block: u64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChainspec {
    #[serde(default)]
    chain_name: Option<String>,
    chain_id: u64,
    consensus: ConsensusKind,
    #[serde(flatten)]
    forks: ForkSchedule,
    #[serde(default)]
    ethash: Option<EthashConfig>,
    #[serde(default)]
    clique: Option<CliqueConfig>,
}

impl FromStr for Chainspec {
    type Err = ChainspecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: RawChainspec = serde_json::from_str(s)?;

        if raw.chain_id == 0 {
            return Err(ChainspecError::ZeroChainId);
        }

        let consensus = match (raw.consensus, raw.ethash, raw.clique) {
            (ConsensusKind::Ethash, _, None) => ConsensusConfig::Ethash,
            (ConsensusKind::Ethash, _, Some(_)) => {
                return Err(ChainspecError::UnexpectedConsensusConfig {
                    kind: ConsensusKind::Ethash,
                    section: ConsensusKind::Clique,
                })
            }
            (ConsensusKind::Clique, None, Some(clique)) => ConsensusConfig::Clique(clique),
            (ConsensusKind::Clique, Some(_), _) => {
                return Err(ChainspecError::UnexpectedConsensusConfig {
                    kind: ConsensusKind::Clique,
                    section: ConsensusKind::Ethash,
                })
            }
            (ConsensusKind::Clique, None, None) => {
                return Err(ChainspecError::MissingConsensusConfig(ConsensusKind::Clique))
            }
        };

        raw.forks.check_order()?;

        Ok(Self {
            chain_name: raw.chain_name,
            chain_id: raw.chain_id,
            parameters: ProtocolParameters {
                consensus,
                forks: raw.forks,
            },
        })
    }
}
