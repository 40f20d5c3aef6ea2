//! alloy-backed [`ChainClient`].

use crate::{ChainClient, ChainError, ChainLog, ChainReceipt, ClientError};
use alloy_consensus::TxEnvelope;
use alloy_network::{eip2718::Encodable2718, EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::Provider;
use alloy_rpc_types::TransactionRequest;
use alloy_rpc_types_eth::BlockNumberOrTag;
use alloy_signer_local::PrivateKeySigner;
use binding::IERC20;
use std::{future::Future, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

/// Fixed gas parameters for payout transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    pub gas_limit: u64,
    /// Legacy gas price in wei.
    pub gas_price: u128,
}

/// Serializes sends of one signer, so concurrent payouts never read the
/// same pending nonce.
#[derive(Clone, Default)]
struct SendQueue {
    lock: Arc<Mutex<()>>,
}

impl SendQueue {
    async fn run<T>(&self, send: impl Future<Output = T>) -> T {
        let _turn = self.lock.lock().await;
        send.await
    }
}

/// Chain client signing payouts with a local private key.
///
/// Clones share the signer's send queue.
#[derive(Clone)]
pub struct EvmClient<P> {
    provider: P,
    wallet: EthereumWallet,
    from: Address,
    chain_id: u64,
    gas: GasSettings,
    sends: SendQueue,
}

impl<P> EvmClient<P>
where
    P: Provider + Clone,
{
    pub fn new(provider: P, signer: PrivateKeySigner, chain_id: u64, gas: GasSettings) -> Self {
        let from = signer.address();
        Self {
            provider,
            wallet: EthereumWallet::from(signer),
            from,
            chain_id,
            gas,
            sends: SendQueue::default(),
        }
    }

    /// Parse the private key and look up the chain id from the node.
    pub async fn connect(
        provider: P,
        private_key: &str,
        gas: GasSettings,
    ) -> Result<Self, ClientError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| ClientError::InvalidPrivateKey(format!("{}", e)))?;
        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| ClientError::Connection(format!("{}", e)))?;

        Ok(Self::new(provider, signer, chain_id, gas))
    }

    /// Address payouts are sent from.
    pub const fn address(&self) -> Address {
        self.from
    }
}

impl<P> ChainClient for EvmClient<P>
where
    P: Provider + Clone,
{
    async fn decimals(&self, token: Address) -> Result<u8, ChainError> {
        let contract = IERC20::new(token, &self.provider);
        contract.decimals().call().await.map_err(rpc_error)
    }

    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(self.from)
            .pending()
            .await
            .map_err(rpc_error)
    }

    async fn transfer(&self, token: Address, to: Address, amount: U256) -> Result<TxHash, ChainError> {
        let contract = IERC20::new(token, &self.provider);
        let call = contract.transfer(to, amount).from(self.from);

        // Simulate first so a revert never reaches the mempool.
        let accepted = call
            .call()
            .await
            .map_err(|e| ChainError::Reverted(e.to_string()))?;
        if !accepted {
            return Err(ChainError::Reverted("transfer returned false".to_string()));
        }

        let request = call.into_transaction_request();
        let (tx_hash, nonce) = self
            .sends
            .run(async {
                // The nonce stays ours until the node has the transaction.
                let nonce = self.pending_nonce().await?;
                let tx = fill_transaction(request, self.from, self.chain_id, nonce, self.gas);

                let envelope: TxEnvelope = tx
                    .build(&self.wallet)
                    .await
                    .map_err(|e| ChainError::Signing(e.to_string()))?;
                let mut encoded = Vec::new();
                envelope.encode_2718(&mut encoded);

                let pending = self
                    .provider
                    .send_raw_transaction(&encoded)
                    .await
                    .map_err(rpc_error)?;
                Ok::<_, ChainError>((*pending.tx_hash(), nonce))
            })
            .await?;

        debug!(%tx_hash, %token, %to, %amount, nonce, "Transfer broadcast");
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<ChainReceipt>, ChainError> {
        let Some(receipt) = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_error)?
        else {
            return Ok(None);
        };

        // Some nodes return receipts of pending transactions without a block.
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };

        let logs = receipt
            .inner
            .logs()
            .iter()
            .map(|log| ChainLog {
                inner: log.inner.clone(),
                removed: log.removed,
            })
            .collect();

        Ok(Some(ChainReceipt {
            tx_hash: receipt.transaction_hash,
            block_number,
            success: receipt.status(),
            logs,
        }))
    }

    async fn block_exists(&self, number: u64) -> Result<bool, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(rpc_error)?;
        Ok(block.is_some())
    }
}

/// Fill the fields of a payout transaction that the contract call leaves empty.
///
/// Gas is never estimated: payouts use the configured limit and legacy price.
pub fn fill_transaction(
    mut tx: TransactionRequest,
    from: Address,
    chain_id: u64,
    nonce: u64,
    gas: GasSettings,
) -> TransactionRequest {
    if tx.from.is_none() {
        tx.from = Some(from);
    }
    tx.chain_id = Some(chain_id);
    tx.nonce = Some(nonce);
    tx.gas = Some(gas.gas_limit);
    tx.gas_price = Some(gas.gas_price);

    tx
}

fn rpc_error(err: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(err.to_string())
}
