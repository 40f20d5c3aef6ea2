use crate::request::LedgerError;
use alloy_primitives::Address;
use std::future::Future;

/// A ledger asset bridged to an ERC20 token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchedAsset {
    /// Ledger asset code.
    pub id: String,
    /// ERC20 contract paying out this asset.
    pub token: Address,
    /// Fixed-point digits of ledger amounts of this asset.
    pub trailing_digits: u8,
    /// Owner account; signs the reviews of this asset's withdrawals.
    pub owner: String,
}

/// Listing of assets eligible for ERC20 withdrawal.
pub trait AssetSource: Send + Sync {
    fn list_assets(
        &self,
        owner: &str,
    ) -> impl Future<Output = Result<Vec<WatchedAsset>, LedgerError>> + Send;
}
