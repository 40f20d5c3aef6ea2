//! Free-form JSON details attached to withdraw requests.
//!
//! Creator details are written by whoever created the request; external
//! details are an append-only list of blocks written by reviewers. The
//! most recent block carrying a field wins.

use serde::Deserialize;
use serde_json::Value;

/// Payout address in creator details.
pub const TARGET_ADDRESS_KEY: &str = "address";
/// Hash of the payout transaction in external details.
pub const TX_HASH_KEY: &str = "eth_tx_hash";
/// Payout amount in contract units in external details.
pub const AMOUNT_KEY: &str = "amount";
/// Block the payout was mined in, recorded on confirmation.
pub const BLOCK_NUMBER_KEY: &str = "eth_block_number";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreatorDetails {
    #[serde(default, rename = "address")]
    pub target_address: String,
}

impl CreatorDetails {
    pub fn parse(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }
}

/// Transfer recorded by the initiator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransferRecord {
    #[serde(default)]
    pub eth_tx_hash: String,
    #[serde(default)]
    pub amount: String,
}

impl TransferRecord {
    /// Most recently appended block that carries a non-empty tx hash.
    pub fn latest(blocks: &[Value]) -> Option<Self> {
        blocks
            .iter()
            .rev()
            .filter_map(|block| Self::deserialize(block).ok())
            .find(|record| !record.eth_tx_hash.is_empty())
    }
}
