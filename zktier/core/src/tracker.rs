use std::time::Duration;

use alloy_primitives::TxHash;
use futures_util::future::try_join_all;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    config::duration_secs,
    errors::{Error, Result},
    ledger::{ClientError, LedgerClient, TransactionSigner},
    submitter::{classify, SubmitterConfig, TransactionHandle, TxSubmitter},
    tier::{ConfirmationTier, TierProgress},
    wait::{wait_for, Deadline, PollPolicy, WaitError},
};

/// Default time allowed for a block to be reported as virtualized.
pub const DEFAULT_VIRTUALIZATION_TIMEOUT: Duration = Duration::from_secs(4 * 60);

/// Default time allowed for a block to be reported as consolidated.
pub const DEFAULT_CONSOLIDATION_TIMEOUT: Duration = Duration::from_secs(4 * 60);

const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tiers that depend on the containing block's batch, in the order they are reached.
const BATCH_TIERS: [ConfirmationTier; 2] =
    [ConfirmationTier::Virtualized, ConfirmationTier::Consolidated];

/// How confirmation waits of a batch are scheduled. Submissions are always sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMode {
    /// One transaction at a time: every mining wait first, then each block's higher tiers.
    #[default]
    Sequential,
    /// Each transaction's waits run alongside the others. Mining deadlines are measured from the
    /// transaction's own submission time.
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    #[serde(flatten)]
    pub submitter: SubmitterConfig,
    #[serde(with = "duration_secs")]
    pub virtualization_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub consolidation_timeout: Duration,
    /// Delay between two batch status lookups.
    #[serde(with = "duration_secs")]
    pub status_poll_interval: Duration,
    pub mode: ConfirmationMode,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            submitter: SubmitterConfig::default(),
            virtualization_timeout: DEFAULT_VIRTUALIZATION_TIMEOUT,
            consolidation_timeout: DEFAULT_CONSOLIDATION_TIMEOUT,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
            mode: ConfirmationMode::default(),
        }
    }
}

/// Final state of one tracked transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub transaction_hash: TxHash,
    /// Containing L2 block. `None` when only `Pooled` was requested.
    pub block_number: Option<u64>,
    pub progress: TierProgress,
}

/// Drives submitted transactions up to a requested [`ConfirmationTier`].
#[derive(Debug, Clone, Default)]
pub struct ConfirmationTracker {
    config: TrackerConfig,
    cancellation: CancellationToken,
}

impl ConfirmationTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            cancellation: CancellationToken::new(),
        }
    }

    /// Cancelling the token stops further submissions and aborts every in-flight wait.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn submitter(&self) -> TxSubmitter {
        TxSubmitter::new(self.config.submitter).with_cancellation(self.cancellation.clone())
    }

    /// Submits `transactions` and waits until each of them reaches `tier`.
    ///
    /// Returns `None` for [`ConfirmationTier::Pooled`], otherwise the containing block numbers in
    /// input order. Any failure aborts the whole batch; transactions already sent at that point
    /// stay on the ledger (see [`TxSubmitter::submit`]).
    pub async fn apply<S, C>(
        &self,
        transactions: &[S::Transaction],
        signer: &S,
        client: &C,
        tier: ConfirmationTier,
    ) -> Result<Option<Vec<u64>>>
    where
        S: TransactionSigner,
        C: LedgerClient,
    {
        let handles = self
            .submitter()
            .submit(transactions, signer, client, false)
            .await?;
        if tier == ConfirmationTier::Pooled {
            return Ok(None);
        }

        let confirmed = self.confirm(client, &handles, tier).await?;
        Ok(Some(
            confirmed
                .into_iter()
                .filter_map(|transaction| transaction.block_number)
                .collect(),
        ))
    }

    /// Waits until every already-submitted transaction reaches `tier`. Handles come from
    /// [`TxSubmitter::submit`], so the node's acceptance of each send counts as `Pooled`.
    pub async fn confirm<C>(
        &self,
        client: &C,
        handles: &[TransactionHandle],
        tier: ConfirmationTier,
    ) -> Result<Vec<ConfirmedTransaction>>
    where
        C: LedgerClient,
    {
        match self.config.mode {
            ConfirmationMode::Sequential => self.confirm_sequential(client, handles, tier).await,
            ConfirmationMode::Concurrent => {
                try_join_all(handles.iter().map(|handle| {
                    let mining_deadline = Deadline::elapsed_from(
                        handle.submitted_at,
                        self.config.submitter.mining_timeout,
                    );
                    self.confirm_one(client, handle.hash, tier, mining_deadline)
                }))
                .await
            }
        }
    }

    /// Waits until a single transaction, known only by hash, reaches `tier`.
    ///
    /// The node is asked about the transaction first, so an unknown hash fails with
    /// [`Error::UnknownTransaction`] instead of being reported as pooled.
    pub async fn track<C>(
        &self,
        client: &C,
        transaction_hash: TxHash,
        tier: ConfirmationTier,
    ) -> Result<ConfirmedTransaction>
    where
        C: LedgerClient,
    {
        let known = client
            .is_transaction_known(transaction_hash)
            .await
            .map_err(|source| Error::Client {
                transaction_hash,
                source,
            })?;
        if !known {
            return Err(Error::UnknownTransaction(transaction_hash));
        }

        self.confirm_one(
            client,
            transaction_hash,
            tier,
            Deadline::After(self.config.submitter.mining_timeout),
        )
        .await
    }

    async fn confirm_sequential<C>(
        &self,
        client: &C,
        handles: &[TransactionHandle],
        tier: ConfirmationTier,
    ) -> Result<Vec<ConfirmedTransaction>>
    where
        C: LedgerClient,
    {
        let mut progress = handles
            .iter()
            .map(|handle| pooled(handle.hash))
            .collect::<Result<Vec<_>>>()?;
        if tier == ConfirmationTier::Pooled {
            return Ok(progress
                .into_iter()
                .map(|progress| ConfirmedTransaction {
                    transaction_hash: progress.transaction_hash(),
                    block_number: None,
                    progress,
                })
                .collect());
        }

        let receipts = self.submitter().await_inclusion(client, handles).await?;
        for (progress, receipt) in progress.iter_mut().zip(&receipts) {
            progress.observe(ConfirmationTier::Mined)?;
            info!(
                "Transaction {} reached {} (block #{})",
                progress.transaction_hash(),
                ConfirmationTier::Mined,
                receipt.block_number
            );
        }

        let mut confirmed = Vec::with_capacity(handles.len());
        for (mut progress, receipt) in progress.into_iter().zip(receipts) {
            self.climb(client, &mut progress, receipt.block_number, tier)
                .await?;
            confirmed.push(ConfirmedTransaction {
                transaction_hash: progress.transaction_hash(),
                block_number: Some(receipt.block_number),
                progress,
            });
        }

        Ok(confirmed)
    }

    async fn confirm_one<C>(
        &self,
        client: &C,
        transaction_hash: TxHash,
        tier: ConfirmationTier,
        mining_deadline: Deadline,
    ) -> Result<ConfirmedTransaction>
    where
        C: LedgerClient,
    {
        let mut progress = pooled(transaction_hash)?;
        if tier == ConfirmationTier::Pooled {
            return Ok(ConfirmedTransaction {
                transaction_hash,
                block_number: None,
                progress,
            });
        }

        let receipt = self
            .submitter()
            .await_mined(client, transaction_hash, mining_deadline)
            .await?;
        progress.observe(ConfirmationTier::Mined)?;
        info!(
            "Transaction {} reached {} (block #{})",
            transaction_hash,
            ConfirmationTier::Mined,
            receipt.block_number
        );

        self.climb(client, &mut progress, receipt.block_number, tier)
            .await?;

        Ok(ConfirmedTransaction {
            transaction_hash,
            block_number: Some(receipt.block_number),
            progress,
        })
    }

    /// Moves a mined transaction up through the batch tiers until `target`. Each tier is only
    /// attempted once the previous one holds, and is never checked again afterwards.
    async fn climb<C>(
        &self,
        client: &C,
        progress: &mut TierProgress,
        block_number: u64,
        target: ConfirmationTier,
    ) -> Result<()>
    where
        C: LedgerClient,
    {
        let transaction_hash = progress.transaction_hash();

        for tier in BATCH_TIERS {
            if tier > target {
                break;
            }

            let timeout = match tier {
                ConfirmationTier::Virtualized => self.config.virtualization_timeout,
                _ => self.config.consolidation_timeout,
            };
            let policy = PollPolicy::new(self.config.status_poll_interval, timeout);

            debug!(
                "Waiting for block #{} of transaction {} to be {}",
                block_number, transaction_hash, tier
            );
            wait_for(policy, &self.cancellation, || async move {
                let status = match tier {
                    ConfirmationTier::Virtualized => client.is_block_virtualized(block_number).await,
                    _ => client.is_block_consolidated(block_number).await,
                };
                status.map_err(classify)
            })
            .await
            .map_err(|err| batch_wait_error(tier, transaction_hash, block_number, err))?;

            progress.observe(tier)?;
            info!(
                "Transaction {} reached {} (block #{})",
                transaction_hash, tier, block_number
            );
        }

        Ok(())
    }
}

fn pooled(transaction_hash: TxHash) -> Result<TierProgress> {
    let mut progress = TierProgress::submitted(transaction_hash);
    progress.observe(ConfirmationTier::Pooled)?;
    Ok(progress)
}

fn batch_wait_error(
    tier: ConfirmationTier,
    transaction_hash: TxHash,
    block_number: u64,
    err: WaitError<ClientError>,
) -> Error {
    match err {
        WaitError::TimedOut { elapsed, .. } if tier == ConfirmationTier::Virtualized => {
            Error::VirtualizationTimeout {
                transaction_hash,
                block_number,
                waited: elapsed,
            }
        }
        WaitError::TimedOut { elapsed, .. } => Error::ConsolidationTimeout {
            transaction_hash,
            block_number,
            waited: elapsed,
        },
        WaitError::Cancelled => Error::Cancelled,
        WaitError::Failed(source) => Error::Client {
            transaction_hash,
            source,
        },
    }
}
