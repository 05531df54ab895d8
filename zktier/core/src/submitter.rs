use std::time::Duration;

use alloy_primitives::TxHash;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    config::duration_secs,
    errors::{Error, Result},
    ledger::{ClientError, LedgerClient, TransactionReceipt, TransactionSigner},
    wait::{wait_until, Deadline, PollError, PollPolicy, WaitError},
};

/// Default time allowed for a single transaction to be mined.
pub const DEFAULT_MINING_TIMEOUT: Duration = Duration::from_secs(180);

const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A transaction accepted by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHandle {
    pub hash: TxHash,
    pub nonce: u64,
    pub submitted_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitterConfig {
    /// Per-transaction deadline for the receipt to show up.
    #[serde(with = "duration_secs")]
    pub mining_timeout: Duration,
    /// Delay between two receipt lookups.
    #[serde(with = "duration_secs")]
    pub receipt_poll_interval: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            mining_timeout: DEFAULT_MINING_TIMEOUT,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }
}

/// Signs and broadcasts batches of transactions, one at a time.
#[derive(Debug, Clone, Default)]
pub struct TxSubmitter {
    config: SubmitterConfig,
    cancellation: CancellationToken,
}

impl TxSubmitter {
    pub fn new(config: SubmitterConfig) -> Self {
        Self {
            config,
            cancellation: CancellationToken::new(),
        }
    }

    /// Shares a cancellation token with the caller. Cancelling it stops new submissions and
    /// aborts any in-flight receipt wait.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Signs and sends `transactions` in order, optionally waiting for each of them to be mined.
    ///
    /// # Partial submission
    ///
    /// The batch is not atomic. When transaction `i` fails to sign or send, the error is returned
    /// right away and carries `index == i`; transactions `0..i` have already been broadcast and
    /// stay on the ledger. The same holds when the batch is cancelled, or when a mining wait
    /// times out (every transaction was sent in that case, later ones are just not awaited).
    pub async fn submit<S, C>(
        &self,
        transactions: &[S::Transaction],
        signer: &S,
        client: &C,
        wait_for_inclusion: bool,
    ) -> Result<Vec<TransactionHandle>>
    where
        S: TransactionSigner,
        C: LedgerClient,
    {
        let mut handles = Vec::with_capacity(transactions.len());

        for (index, transaction) in transactions.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                info!("Submission cancelled, {} transactions already sent", index);
                return Err(Error::Cancelled);
            }

            let signed = signer
                .sign(transaction)
                .await
                .map_err(|source| Error::Signing { index, source })?;
            let reported_hash = client
                .send_raw_transaction(&signed)
                .await
                .map_err(|source| Error::Submission { index, source })?;
            if reported_hash != signed.hash {
                warn!(
                    "Node reported hash {} for transaction {} (nonce {})",
                    reported_hash, signed.hash, signed.nonce
                );
            }

            info!(
                "[{} / {}] Transaction sent: {} (nonce {})",
                index + 1,
                transactions.len(),
                signed.hash,
                signed.nonce
            );
            handles.push(TransactionHandle {
                hash: signed.hash,
                nonce: signed.nonce,
                submitted_at: Instant::now(),
            });
        }

        if wait_for_inclusion {
            self.await_inclusion(client, &handles).await?;
        }

        Ok(handles)
    }

    /// Waits for every handle to be mined, one after the other, returning receipts in input
    /// order. The first timeout aborts the remaining waits.
    pub async fn await_inclusion<C>(
        &self,
        client: &C,
        handles: &[TransactionHandle],
    ) -> Result<Vec<TransactionReceipt>>
    where
        C: LedgerClient,
    {
        let mut receipts = Vec::with_capacity(handles.len());
        for handle in handles {
            let receipt = self
                .await_mined(
                    client,
                    handle.hash,
                    Deadline::After(self.config.mining_timeout),
                )
                .await?;
            receipts.push(receipt);
        }

        Ok(receipts)
    }

    /// Polls for the receipt of `transaction_hash` until `deadline`.
    pub async fn await_mined<C>(
        &self,
        client: &C,
        transaction_hash: TxHash,
        deadline: Deadline,
    ) -> Result<TransactionReceipt>
    where
        C: LedgerClient,
    {
        let policy = PollPolicy {
            interval: self.config.receipt_poll_interval,
            deadline,
        };

        let receipt = wait_until(policy, &self.cancellation, || async move {
            client
                .transaction_receipt(transaction_hash)
                .await
                .map_err(classify)
        })
        .await
        .map_err(|err| match err {
            WaitError::TimedOut { elapsed, .. } => Error::MiningTimeout {
                transaction_hash,
                waited: elapsed,
            },
            WaitError::Cancelled => Error::Cancelled,
            WaitError::Failed(source) => Error::Client {
                transaction_hash,
                source,
            },
        })?;

        if !receipt.succeeded {
            warn!(
                "Transaction {} was mined in block #{} but reverted",
                transaction_hash, receipt.block_number
            );
        }
        debug!(
            "Transaction {} mined in block #{}",
            transaction_hash, receipt.block_number
        );

        Ok(receipt)
    }
}

/// Maps client failures onto the wait loop's retry policy.
pub(crate) fn classify(err: ClientError) -> PollError<ClientError> {
    if err.is_transient() {
        PollError::Transient(err)
    } else {
        PollError::Fatal(err)
    }
}
