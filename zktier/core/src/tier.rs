use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use alloy_primitives::TxHash;

use crate::errors::Error;

/// Finality tiers a transaction moves through on a zkEVM rollup, from weakest to strongest.
///
/// The ordering is meaningful: reaching a tier implies every lower tier already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConfirmationTier {
    /// Accepted into the node's transaction pool.
    Pooled = 0,
    /// Included in an L2 block by the trusted sequencer.
    Mined = 1,
    /// The containing block's batch has been posted to L1.
    Virtualized = 2,
    /// The containing block's batch has been proven and verified on L1.
    Consolidated = 3,
}

impl ConfirmationTier {
    pub const TRUSTED: Self = Self::Mined;
    pub const VERIFIED: Self = Self::Consolidated;

    pub const ALL: [Self; 4] = [
        Self::Pooled,
        Self::Mined,
        Self::Virtualized,
        Self::Consolidated,
    ];

    /// The tier directly above this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pooled => Some(Self::Mined),
            Self::Mined => Some(Self::Virtualized),
            Self::Virtualized => Some(Self::Consolidated),
            Self::Consolidated => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pooled => "pooled",
            Self::Mined => "mined",
            Self::Virtualized => "virtualized",
            Self::Consolidated => "consolidated",
        }
    }
}

impl From<ConfirmationTier> for u8 {
    fn from(tier: ConfirmationTier) -> Self {
        tier as u8
    }
}

impl TryFrom<u8> for ConfirmationTier {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pooled),
            1 => Ok(Self::Mined),
            2 => Ok(Self::Virtualized),
            3 => Ok(Self::Consolidated),
            _ => Err(Error::InvalidTier(value.to_string())),
        }
    }
}

impl FromStr for ConfirmationTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "pooled" => Ok(Self::Pooled),
            "1" | "mined" | "trusted" => Ok(Self::Mined),
            "2" | "virtualized" => Ok(Self::Virtualized),
            "3" | "consolidated" | "verified" => Ok(Self::Consolidated),
            _ => Err(Error::InvalidTier(s.to_string())),
        }
    }
}

impl fmt::Display for ConfirmationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A tier together with the moment it was first observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierObservation {
    pub tier: ConfirmationTier,
    pub observed_at: Instant,
}

/// One-way progress of a single transaction through the finality tiers.
///
/// Tiers can only be observed in order, one step at a time. Observing the current tier again is a
/// no-op; anything else (going back, or jumping over a tier) is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierProgress {
    transaction_hash: TxHash,
    history: Vec<TierObservation>,
}

impl TierProgress {
    /// Progress of a transaction that has been handed to the ledger but not yet observed at any
    /// tier.
    pub fn submitted(transaction_hash: TxHash) -> Self {
        Self {
            transaction_hash,
            history: Vec::with_capacity(ConfirmationTier::ALL.len()),
        }
    }

    pub fn transaction_hash(&self) -> TxHash {
        self.transaction_hash
    }

    /// Highest tier observed so far, `None` while only submitted.
    pub fn reached(&self) -> Option<ConfirmationTier> {
        self.history.last().map(|observation| observation.tier)
    }

    pub fn history(&self) -> &[TierObservation] {
        &self.history
    }

    /// When `tier` was observed, if it has been.
    pub fn observed_at(&self, tier: ConfirmationTier) -> Option<Instant> {
        self.history
            .iter()
            .find(|observation| observation.tier == tier)
            .map(|observation| observation.observed_at)
    }

    /// Records that `tier` has been observed now.
    pub fn observe(&mut self, tier: ConfirmationTier) -> Result<(), Error> {
        self.observe_at(tier, Instant::now())
    }

    fn observe_at(&mut self, tier: ConfirmationTier, observed_at: Instant) -> Result<(), Error> {
        let expected = match self.reached() {
            Some(reached) if reached == tier => return Ok(()),
            Some(reached) => reached.next(),
            None => Some(ConfirmationTier::Pooled),
        };

        if expected != Some(tier) {
            return Err(Error::TierTransition {
                transaction_hash: self.transaction_hash,
                from: self.reached(),
                to: tier,
            });
        }

        self.history.push(TierObservation { tier, observed_at });
        Ok(())
    }
}
