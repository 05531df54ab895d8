use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;
use url::Url;
use zktier_core::{
    config::HarnessConfig,
    ledger::JsonRpcLedgerClient,
    tier::ConfirmationTier,
    tracker::ConfirmationTracker,
    TxHash,
};

#[derive(Debug, Parser)]
pub struct Watch {
    /// L2 node JSON-RPC URL
    #[clap(long, env = "ZKTIER_RPC_URL")]
    rpc_url: Url,
    /// Hash of the transaction to follow
    #[clap(long)]
    tx_hash: TxHash,
    /// Tier to wait for (pooled, mined, virtualized, consolidated)
    #[clap(long, default_value = "consolidated")]
    tier: ConfirmationTier,
    /// Path to a JSON harness configuration file
    #[clap(long, env = "ZKTIER_CONFIG")]
    config: Option<PathBuf>,
    /// Overrides the mining timeout, in seconds
    #[clap(long)]
    mining_timeout: Option<u64>,
    /// Overrides the virtualization timeout, in seconds
    #[clap(long)]
    virtualization_timeout: Option<u64>,
    /// Overrides the consolidation timeout, in seconds
    #[clap(long)]
    consolidation_timeout: Option<u64>,
}

impl Watch {
    pub async fn run(self) -> Result<()> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)?,
            None => HarnessConfig::default(),
        };
        if let Some(secs) = self.mining_timeout {
            config.tracker.submitter.mining_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.virtualization_timeout {
            config.tracker.virtualization_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.consolidation_timeout {
            config.tracker.consolidation_timeout = Duration::from_secs(secs);
        }

        let client = JsonRpcLedgerClient::new(self.rpc_url)?;
        info!(
            "Connected to chain {} at {}",
            client.chain_id().await?,
            client.rpc_url()
        );

        let cancellation = CancellationToken::new();
        tokio::spawn({
            let cancellation = cancellation.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl-C received, cancelling");
                    cancellation.cancel();
                }
            }
        });

        let tracker = ConfirmationTracker::new(config.tracker).with_cancellation(cancellation);
        let confirmed = tracker.track(&client, self.tx_hash, self.tier).await?;

        match confirmed.block_number {
            Some(block_number) => println!(
                "{} reached {} in block #{}",
                confirmed.transaction_hash, self.tier, block_number
            ),
            None => println!("{} reached {}", confirmed.transaction_hash, self.tier),
        }
        if let Some(pooled_at) = confirmed.progress.observed_at(ConfirmationTier::Pooled) {
            for tier in ConfirmationTier::ALL {
                if let Some(observed_at) = confirmed.progress.observed_at(tier) {
                    println!(
                        "  {:<12} +{:?}",
                        tier,
                        observed_at.duration_since(pooled_at)
                    );
                }
            }
        }

        Ok(())
    }
}
