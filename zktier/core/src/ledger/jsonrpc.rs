use std::time::Duration;

use alloy_primitives::{Bytes, TxHash, U64};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::TransactionReceipt as RpcTransactionReceipt;
use alloy_transport_http::Http;
use log::trace;
use reqwest::ClientBuilder;
use serde_json::Value;
use url::Url;

use crate::ledger::{ClientError, LedgerClient, SignedTransaction, TransactionReceipt};

const JSONRPC_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// [`LedgerClient`] speaking Ethereum JSON-RPC plus the `zkevm_*` namespace over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcLedgerClient {
    client: RpcClient,
    rpc_url: Url,
}

impl JsonRpcLedgerClient {
    pub fn new(rpc_url: Url) -> Result<Self, reqwest::Error> {
        let http_client = ClientBuilder::new().timeout(JSONRPC_HTTP_TIMEOUT).build()?;

        Ok(Self {
            client: RpcClient::new(Http::with_client(http_client, rpc_url.clone()), false),
            rpc_url,
        })
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    /// Chain id reported by the node, to check it against a resolved network descriptor.
    pub async fn chain_id(&self) -> Result<u64, ClientError> {
        let chain_id = self
            .client
            .request_noparams::<U64>("eth_chainId")
            .await?;
        Ok(chain_id.to())
    }

    async fn block_status(
        &self,
        method: &'static str,
        block_number: u64,
    ) -> Result<bool, ClientError> {
        trace!("{} #{}", method, block_number);
        Ok(self
            .client
            .request::<_, bool>(method, (U64::from(block_number),))
            .await?)
    }
}

/// Narrows a node receipt to what the tiers need. Some nodes return pending receipts without a
/// block number, which count as not mined yet.
fn mined_receipt(receipt: RpcTransactionReceipt) -> Option<TransactionReceipt> {
    Some(TransactionReceipt {
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number?,
        succeeded: receipt.status(),
    })
}

impl LedgerClient for JsonRpcLedgerClient {
    async fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<TxHash, ClientError> {
        let raw = Bytes::copy_from_slice(&transaction.raw);
        Ok(self
            .client
            .request::<_, TxHash>("eth_sendRawTransaction", (raw,))
            .await?)
    }

    async fn is_transaction_known(&self, transaction_hash: TxHash) -> Result<bool, ClientError> {
        let transaction = self
            .client
            .request::<_, Option<Value>>("eth_getTransactionByHash", (transaction_hash,))
            .await?;
        Ok(transaction.is_some())
    }

    async fn transaction_receipt(
        &self,
        transaction_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ClientError> {
        let receipt = self
            .client
            .request::<_, Option<RpcTransactionReceipt>>(
                "eth_getTransactionReceipt",
                (transaction_hash,),
            )
            .await?;
        Ok(receipt.and_then(mined_receipt))
    }

    async fn is_block_virtualized(&self, block_number: u64) -> Result<bool, ClientError> {
        self.block_status("zkevm_isBlockVirtualized", block_number)
            .await
    }

    async fn is_block_consolidated(&self, block_number: u64) -> Result<bool, ClientError> {
        self.block_status("zkevm_isBlockConsolidated", block_number)
            .await
    }
}
