use alloy_primitives::{Address, Log, TxHash, U256};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    /// Transport or node-side failure; worth retrying later.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The transaction could not be built or signed locally.
    #[error("signing error: {0}")]
    Signing(String),

    /// The call reverted (or returned `false`) when simulated.
    #[error("execution reverted: {0}")]
    Reverted(String),
}

/// A log entry of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
    pub inner: Log,
    /// Set by the node when a reorg dropped the block holding this log.
    pub removed: bool,
}

/// The subset of a transaction receipt the confirmer inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// Execution status (`true` when the transaction succeeded).
    pub success: bool,
    pub logs: Vec<ChainLog>,
}

/// Chain capabilities the withdraw workers depend on.
///
/// "Not found" answers are modelled as `Ok(None)` / `Ok(false)` so callers
/// can tell an unmined transaction or block apart from an RPC failure.
pub trait ChainClient: Send + Sync {
    /// `decimals()` of an ERC20 contract.
    fn decimals(&self, token: Address) -> impl Future<Output = Result<u8, ChainError>> + Send;

    /// Pending nonce of the configured signer.
    fn pending_nonce(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Sign and broadcast `token.transfer(to, amount)` from the configured signer.
    ///
    /// Returns the hash of the broadcast transaction; it is not awaited.
    fn transfer(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, ChainError>> + Send;

    /// Receipt of a mined transaction, `None` while it is unknown or pending.
    fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<ChainReceipt>, ChainError>> + Send;

    /// Whether a block at `number` has been mined.
    fn block_exists(&self, number: u64) -> impl Future<Output = Result<bool, ChainError>> + Send;
}
