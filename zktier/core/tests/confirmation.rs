use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use zktier_core::{
    ledger::{ClientError, LedgerClient, SignedTransaction, TransactionReceipt, TransactionSigner},
    submitter::SubmitterConfig,
    tier::ConfirmationTier,
    tracker::{ConfirmationMode, ConfirmationTracker, TrackerConfig},
    Error, TxHash,
};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// When each tier becomes visible, relative to the ledger's creation.
#[derive(Debug, Clone, Copy)]
struct BlockSchedule {
    mined: Duration,
    virtualized: Duration,
    consolidated: Duration,
}

/// In-memory zkEVM node driven by the (paused) tokio clock.
struct SimulatedLedger {
    genesis: Instant,
    block_number: u64,
    schedule: BlockSchedule,
    sent: Mutex<Vec<TxHash>>,
    submitted_at: Mutex<HashMap<TxHash, Instant>>,
    status_queries: Mutex<Vec<(ConfirmationTier, Duration)>>,
    /// Errors returned, oldest first, before virtualization status is answered.
    virtualization_failures: Mutex<VecDeque<ClientError>>,
}

impl SimulatedLedger {
    fn new(block_number: u64, schedule: BlockSchedule) -> Self {
        Self {
            genesis: Instant::now(),
            block_number,
            schedule,
            sent: Default::default(),
            submitted_at: Default::default(),
            status_queries: Default::default(),
            virtualization_failures: Default::default(),
        }
    }

    fn failing_virtualization<I>(mut self, failures: I) -> Self
    where
        I: IntoIterator<Item = ClientError>,
    {
        self.virtualization_failures = Mutex::new(failures.into_iter().collect());
        self
    }

    fn elapsed(&self) -> Duration {
        self.genesis.elapsed()
    }

    fn sent(&self) -> Vec<TxHash> {
        self.sent.lock().unwrap().clone()
    }
}

impl LedgerClient for SimulatedLedger {
    async fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<TxHash, ClientError> {
        self.sent.lock().unwrap().push(transaction.hash);
        self.submitted_at
            .lock()
            .unwrap()
            .insert(transaction.hash, Instant::now());
        Ok(transaction.hash)
    }

    async fn is_transaction_known(&self, transaction_hash: TxHash) -> Result<bool, ClientError> {
        Ok(self
            .submitted_at
            .lock()
            .unwrap()
            .contains_key(&transaction_hash))
    }

    async fn transaction_receipt(
        &self,
        transaction_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ClientError> {
        let Some(submitted_at) = self
            .submitted_at
            .lock()
            .unwrap()
            .get(&transaction_hash)
            .copied()
        else {
            return Ok(None);
        };

        let mined = submitted_at.duration_since(self.genesis) + self.schedule.mined;
        Ok((self.elapsed() >= mined).then_some(TransactionReceipt {
            transaction_hash,
            block_number: self.block_number,
            succeeded: true,
        }))
    }

    async fn is_block_virtualized(&self, block_number: u64) -> Result<bool, ClientError> {
        assert_eq!(block_number, self.block_number);
        self.status_queries
            .lock()
            .unwrap()
            .push((ConfirmationTier::Virtualized, self.elapsed()));
        if let Some(err) = self.virtualization_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.elapsed() >= self.schedule.virtualized)
    }

    async fn is_block_consolidated(&self, block_number: u64) -> Result<bool, ClientError> {
        assert_eq!(block_number, self.block_number);
        self.status_queries
            .lock()
            .unwrap()
            .push((ConfirmationTier::Consolidated, self.elapsed()));
        Ok(self.elapsed() >= self.schedule.consolidated)
    }
}

/// Hands out increasing nonces; the transaction payload is only used to derive the hash.
#[derive(Default)]
struct SequentialSigner {
    next_nonce: Mutex<u64>,
    fail_on_nonce: Option<u64>,
}

impl TransactionSigner for SequentialSigner {
    type Transaction = &'static str;

    async fn sign(&self, transaction: &&'static str) -> anyhow::Result<SignedTransaction> {
        let nonce = {
            let mut next_nonce = self.next_nonce.lock().unwrap();
            let nonce = *next_nonce;
            *next_nonce += 1;
            nonce
        };
        if self.fail_on_nonce == Some(nonce) {
            anyhow::bail!("signer refused nonce {}", nonce);
        }

        let mut hash = [0u8; 32];
        hash[0] = nonce as u8;
        hash[1..1 + transaction.len().min(31)]
            .copy_from_slice(&transaction.as_bytes()[..transaction.len().min(31)]);
        Ok(SignedTransaction {
            hash: TxHash::new(hash),
            nonce,
            raw: transaction.as_bytes().to_vec(),
        })
    }
}

fn tracker(mode: ConfirmationMode) -> ConfirmationTracker {
    ConfirmationTracker::new(TrackerConfig {
        submitter: SubmitterConfig {
            mining_timeout: Duration::from_secs(180),
            receipt_poll_interval: POLL_INTERVAL,
        },
        status_poll_interval: POLL_INTERVAL,
        mode,
        ..Default::default()
    })
}

fn standard_schedule() -> BlockSchedule {
    BlockSchedule {
        mined: Duration::ZERO,
        virtualized: Duration::from_secs(30),
        consolidated: Duration::from_secs(90),
    }
}

#[tokio::test(start_paused = true)]
async fn test_apply_consolidated_waits_for_every_tier() {
    let ledger = SimulatedLedger::new(100, standard_schedule());
    let start = Instant::now();

    let blocks = tracker(ConfirmationMode::Sequential)
        .apply(
            &["transfer", "approve"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Consolidated,
        )
        .await
        .unwrap();

    let elapsed = start.elapsed();
    assert_eq!(blocks, Some(vec![100, 100]));
    assert!(elapsed >= Duration::from_secs(90), "returned at {:?}", elapsed);
    assert!(
        elapsed <= Duration::from_secs(90) + POLL_INTERVAL,
        "returned at {:?}",
        elapsed
    );

    // Consolidation is only ever queried once virtualization has been observed.
    let queries = ledger.status_queries.lock().unwrap().clone();
    let first_consolidation = queries
        .iter()
        .position(|(tier, _)| *tier == ConfirmationTier::Consolidated)
        .unwrap();
    assert!(queries[..first_consolidation]
        .iter()
        .any(|(tier, at)| *tier == ConfirmationTier::Virtualized && *at >= Duration::from_secs(30)));
}

#[tokio::test(start_paused = true)]
async fn test_apply_pooled_returns_nothing_without_waiting() {
    let ledger = SimulatedLedger::new(100, standard_schedule());
    let start = Instant::now();

    let blocks = tracker(ConfirmationMode::Sequential)
        .apply(
            &["a", "b", "c"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Pooled,
        )
        .await
        .unwrap();

    assert_eq!(blocks, None);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(ledger.sent().len(), 3);
    assert!(ledger.status_queries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_apply_stops_at_requested_tier() {
    let ledger = SimulatedLedger::new(42, standard_schedule());

    let blocks = tracker(ConfirmationMode::Sequential)
        .apply(
            &["a"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Virtualized,
        )
        .await
        .unwrap();

    assert_eq!(blocks, Some(vec![42]));
    assert!(ledger
        .status_queries
        .lock()
        .unwrap()
        .iter()
        .all(|(tier, _)| *tier == ConfirmationTier::Virtualized));
}

#[tokio::test(start_paused = true)]
async fn test_progress_history_is_ordered() {
    let ledger = SimulatedLedger::new(7, standard_schedule());
    let tracker = tracker(ConfirmationMode::Sequential);

    let handles = zktier_core::submitter::TxSubmitter::default()
        .submit(&["a", "b"], &SequentialSigner::default(), &ledger, false)
        .await
        .unwrap();
    let confirmed = tracker
        .confirm(&ledger, &handles, ConfirmationTier::Consolidated)
        .await
        .unwrap();

    for transaction in confirmed {
        let history = transaction.progress.history();
        let tiers = history.iter().map(|o| o.tier).collect::<Vec<_>>();
        assert_eq!(tiers, ConfirmationTier::ALL.to_vec());
        assert!(history
            .windows(2)
            .all(|pair| pair[0].observed_at <= pair[1].observed_at));
    }
}

#[tokio::test(start_paused = true)]
async fn test_virtualization_timeout_reports_block() {
    let ledger = SimulatedLedger::new(
        100,
        BlockSchedule {
            mined: Duration::ZERO,
            virtualized: Duration::from_secs(3600),
            consolidated: Duration::from_secs(3600),
        },
    );
    let start = Instant::now();

    let err = tracker(ConfirmationMode::Sequential)
        .apply(
            &["a", "b"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Consolidated,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::VirtualizationTimeout {
            block_number: 100,
            ..
        }
    ));
    // Default four minute budget for the first transaction only.
    assert!(start.elapsed() >= Duration::from_secs(240));
    assert!(start.elapsed() <= Duration::from_secs(240) + POLL_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_signing_failure_after_partial_submission() {
    let ledger = SimulatedLedger::new(100, standard_schedule());
    let signer = SequentialSigner {
        fail_on_nonce: Some(2),
        ..Default::default()
    };

    let err = tracker(ConfirmationMode::Sequential)
        .apply(
            &["a", "b", "c", "d"],
            &signer,
            &ledger,
            ConfirmationTier::Consolidated,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Signing { index: 2, .. }));
    assert_eq!(ledger.sent().len(), 2);
    assert!(ledger.status_queries.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_waits() {
    let ledger = SimulatedLedger::new(
        100,
        BlockSchedule {
            mined: Duration::ZERO,
            virtualized: Duration::from_secs(3600),
            consolidated: Duration::from_secs(3600),
        },
    );
    let cancellation = CancellationToken::new();
    let tracker = tracker(ConfirmationMode::Sequential).with_cancellation(cancellation.clone());

    tokio::spawn(async move {
        sleep(Duration::from_secs(60)).await;
        cancellation.cancel();
    });

    let start = Instant::now();
    let err = tracker
        .apply(
            &["a"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Virtualized,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_eq!(ledger.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_mode_preserves_order() {
    let ledger = SimulatedLedger::new(100, standard_schedule());
    let start = Instant::now();

    let blocks = tracker(ConfirmationMode::Concurrent)
        .apply(
            &["a", "b", "c"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Consolidated,
        )
        .await
        .unwrap();

    assert_eq!(blocks, Some(vec![100, 100, 100]));
    let sent = ledger.sent();
    assert_eq!(sent.iter().map(|hash| hash.0[0]).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(start.elapsed() >= Duration::from_secs(90));
    assert!(start.elapsed() <= Duration::from_secs(90) + POLL_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_mining_deadline_counts_from_submission() {
    let ledger = SimulatedLedger::new(
        100,
        BlockSchedule {
            mined: Duration::from_secs(3600),
            virtualized: Duration::ZERO,
            consolidated: Duration::ZERO,
        },
    );
    let tracker = ConfirmationTracker::new(TrackerConfig {
        submitter: SubmitterConfig {
            mining_timeout: Duration::from_secs(20),
            receipt_poll_interval: POLL_INTERVAL,
        },
        mode: ConfirmationMode::Concurrent,
        ..Default::default()
    });
    let handles = zktier_core::submitter::TxSubmitter::default()
        .submit(&["a"], &SequentialSigner::default(), &ledger, false)
        .await
        .unwrap();

    // Most of the budget is spent before tracking even starts.
    sleep(Duration::from_secs(15)).await;
    let start = Instant::now();
    let err = tracker
        .confirm(&ledger, &handles, ConfirmationTier::Mined)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MiningTimeout { .. }));
    assert!(start.elapsed() <= Duration::from_secs(5) + POLL_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_consolidation_timeout_after_virtualization() {
    let ledger = SimulatedLedger::new(
        100,
        BlockSchedule {
            mined: Duration::ZERO,
            virtualized: Duration::from_secs(30),
            consolidated: Duration::from_secs(3600),
        },
    );
    let start = Instant::now();

    let err = tracker(ConfirmationMode::Sequential)
        .apply(
            &["a"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Consolidated,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::ConsolidationTimeout {
            block_number: 100,
            ..
        }
    ));
    let consolidation_budget = Duration::from_secs(30 + 240);
    assert!(start.elapsed() >= consolidation_budget);
    assert!(start.elapsed() <= consolidation_budget + POLL_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_rpc_error_ends_tier_wait() {
    let ledger = SimulatedLedger::new(100, standard_schedule()).failing_virtualization([
        ClientError::Rpc {
            code: -32601,
            message: "the method zkevm_isBlockVirtualized does not exist".into(),
        },
    ]);
    let start = Instant::now();

    let err = tracker(ConfirmationMode::Sequential)
        .apply(
            &["a"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Virtualized,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Client {
            source: ClientError::Rpc { code: -32601, .. },
            ..
        }
    ));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_node_is_retried() {
    let ledger = SimulatedLedger::new(100, standard_schedule()).failing_virtualization([
        ClientError::HttpStatus(503),
        ClientError::HttpStatus(503),
    ]);
    let start = Instant::now();

    let blocks = tracker(ConfirmationMode::Sequential)
        .apply(
            &["a"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Virtualized,
        )
        .await
        .unwrap();

    assert_eq!(blocks, Some(vec![100]));
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_track_requires_known_transaction() {
    let ledger = SimulatedLedger::new(100, standard_schedule());
    let tracker = tracker(ConfirmationMode::Sequential);

    let unknown = TxHash::repeat_byte(0xee);
    let err = tracker
        .track(&ledger, unknown, ConfirmationTier::Pooled)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownTransaction(hash) if hash == unknown));

    let handles = zktier_core::submitter::TxSubmitter::default()
        .submit(&["a"], &SequentialSigner::default(), &ledger, false)
        .await
        .unwrap();
    let confirmed = tracker
        .track(&ledger, handles[0].hash, ConfirmationTier::Mined)
        .await
        .unwrap();
    assert_eq!(confirmed.block_number, Some(100));
    assert_eq!(confirmed.progress.reached(), Some(ConfirmationTier::Mined));
}

#[tokio::test(start_paused = true)]
async fn test_huge_mining_timeout_in_concurrent_mode() {
    let ledger = SimulatedLedger::new(100, standard_schedule());
    let tracker = ConfirmationTracker::new(TrackerConfig {
        submitter: SubmitterConfig {
            mining_timeout: Duration::from_secs(u64::MAX),
            receipt_poll_interval: POLL_INTERVAL,
        },
        status_poll_interval: POLL_INTERVAL,
        mode: ConfirmationMode::Concurrent,
        ..Default::default()
    });

    let blocks = tracker
        .apply(
            &["a", "b"],
            &SequentialSigner::default(),
            &ledger,
            ConfirmationTier::Consolidated,
        )
        .await
        .unwrap();

    assert_eq!(blocks, Some(vec![100, 100]));
}
