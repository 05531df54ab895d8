use std::{path::PathBuf, time::Duration};

use alloy_primitives::{TxHash, B256};

use crate::{ledger::ClientError, tier::ConfirmationTier};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
    #[error("malformed chainspec {}: {reason}", .path.display())]
    ConfigParse { path: PathBuf, reason: String },
    #[error("failed to read chainspec {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transaction {0} is unknown to the node")]
    UnknownTransaction(TxHash),
    #[error("invalid confirmation tier: {0}")]
    InvalidTier(String),
    #[error("failed to sign transaction #{index} ({index} already submitted): {source}")]
    Signing {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to submit transaction #{index} ({index} already submitted): {source}")]
    Submission {
        index: usize,
        #[source]
        source: ClientError,
    },
    #[error("transaction {transaction_hash} not mined after {waited:?}")]
    MiningTimeout {
        transaction_hash: TxHash,
        waited: Duration,
    },
    #[error(
        "block #{block_number} of transaction {transaction_hash} not virtualized after {waited:?} \
        (last reached: mined)"
    )]
    VirtualizationTimeout {
        transaction_hash: TxHash,
        block_number: u64,
        waited: Duration,
    },
    #[error(
        "block #{block_number} of transaction {transaction_hash} not consolidated after \
        {waited:?} (last reached: virtualized)"
    )]
    ConsolidationTimeout {
        transaction_hash: TxHash,
        block_number: u64,
        waited: Duration,
    },
    #[error("cancelled")]
    Cancelled,
    #[error("ledger client error while waiting for transaction {transaction_hash}: {source}")]
    Client {
        transaction_hash: TxHash,
        #[source]
        source: ClientError,
    },
    #[error("transaction {transaction_hash} cannot move from {} to {to}", display_tier(.from))]
    TierTransition {
        transaction_hash: TxHash,
        from: Option<ConfirmationTier>,
        to: ConfirmationTier,
    },
}

/// Defect found while building the statically embedded network table. Always a packaging problem,
/// never a runtime input problem.
#[derive(thiserror::Error, Debug)]
pub enum InitializationError {
    #[error("embedded chainspec for `{name}` is malformed: {reason}")]
    MalformedChainspec { name: String, reason: String },
    #[error("network `{0}` is declared more than once")]
    DuplicateName(String),
    #[error("genesis hash {hash} is declared by both `{first}` and `{second}`")]
    DuplicateGenesisHash {
        hash: B256,
        first: String,
        second: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn display_tier(tier: &Option<ConfirmationTier>) -> &'static str {
    match tier {
        Some(tier) => tier.as_str(),
        None => "submitted",
    }
}
