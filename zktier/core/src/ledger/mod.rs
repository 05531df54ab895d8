use std::future::Future;

use alloy_json_rpc::RpcError;
use alloy_primitives::TxHash;
use alloy_transport::{TransportError, TransportErrorKind};

mod jsonrpc;
pub use jsonrpc::JsonRpcLedgerClient;

/// A transaction ready to be broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: TxHash,
    pub nonce: u64,
    /// Canonical encoding accepted by `eth_sendRawTransaction`.
    pub raw: Vec<u8>,
}

/// The subset of a transaction receipt the confirmation tiers care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    /// L2 block containing the transaction.
    pub block_number: u64,
    /// `false` if execution reverted. A reverted transaction is still included in a block.
    pub succeeded: bool,
}

/// Signs transactions for one account on one chain.
///
/// Implementations own nonce assignment and are expected to hand out strictly increasing nonces
/// in call order.
pub trait TransactionSigner {
    /// Unsigned transaction type accepted by this signer.
    type Transaction;

    fn sign(
        &self,
        transaction: &Self::Transaction,
    ) -> impl Future<Output = anyhow::Result<SignedTransaction>> + Send;
}

/// Read and write access to a zkEVM node.
pub trait LedgerClient {
    /// Broadcasts a signed transaction, returning the hash reported by the node.
    fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> impl Future<Output = Result<TxHash, ClientError>> + Send;

    /// Whether the node knows the transaction at all, either still pooled or already mined.
    fn is_transaction_known(
        &self,
        transaction_hash: TxHash,
    ) -> impl Future<Output = Result<bool, ClientError>> + Send;

    /// `Ok(None)` while the transaction is not yet in a block.
    fn transaction_receipt(
        &self,
        transaction_hash: TxHash,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, ClientError>> + Send;

    /// Whether the batch containing `block_number` has been sequenced on L1.
    fn is_block_virtualized(
        &self,
        block_number: u64,
    ) -> impl Future<Output = Result<bool, ClientError>> + Send;

    /// Whether the batch containing `block_number` has been verified on L1.
    fn is_block_consolidated(
        &self,
        block_number: u64,
    ) -> impl Future<Output = Result<bool, ClientError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a JSON-RPC response.
    #[error(transparent)]
    Transport(TransportErrorKind),
    #[error("unsuccessful status code: {0}")]
    HttpStatus(u16),
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether the same request may succeed if simply tried again later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(kind) => {
                matches!(
                    kind,
                    TransportErrorKind::BackendGone | TransportErrorKind::Custom(_)
                )
            }
            Self::HttpStatus(status) => *status >= 500 || *status == 429,
            Self::Rpc { .. } | Self::Decode(_) => false,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => Self::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            RpcError::Transport(TransportErrorKind::HttpError(err)) => Self::HttpStatus(err.status),
            RpcError::Transport(kind) => Self::Transport(kind),
            err => Self::Decode(err.to_string()),
        }
    }
}
