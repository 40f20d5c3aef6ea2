//! Withdraw requests and the paginated query interface over them.

use crate::{
    asset::WatchedAsset,
    review::{ReviewOp, SubmitError, SubmitResult},
    task::{RequestStage, TaskSet, UnexpectedTasks},
};
use serde_json::Value;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed ledger record {id}: {reason}")]
    Malformed { id: String, reason: String },
}

/// Review state of a ledger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Pending = 1,
    Canceled = 2,
    Approved = 3,
    Rejected = 4,
    PermanentlyRejected = 5,
}

impl RequestState {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Pending),
            2 => Some(Self::Canceled),
            3 => Some(Self::Approved),
            4 => Some(Self::Rejected),
            5 => Some(Self::PermanentlyRejected),
            _ => None,
        }
    }
}

/// A ledger instruction to pay out on the ERC20 chain.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawRequest {
    pub id: u64,
    /// Content hash; review operations are refused when it is stale.
    pub hash: String,
    pub asset: String,
    pub state: RequestState,
    /// Requested amount in ledger fixed-point units.
    pub amount: u64,
    pub pending_tasks: TaskSet,
    pub creator_details: Value,
    /// Blocks appended by reviewers, oldest first.
    pub external_details: Vec<Value>,
}

impl WithdrawRequest {
    pub fn stage(&self) -> Result<RequestStage, UnexpectedTasks> {
        RequestStage::from_tasks(self.pending_tasks)
    }
}

/// Filter over withdraw requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestQuery {
    pub asset: String,
    pub reviewer: String,
    pub state: RequestState,
    /// Bits that must all be set.
    pub pending_tasks: TaskSet,
    /// Bits that must all be clear.
    pub pending_tasks_not_set: TaskSet,
    pub limit: u32,
    /// Fixed-point digits the asset's amounts are decoded with. Not sent.
    pub amount_digits: u8,
}

impl RequestQuery {
    /// Requests the initiator picks up.
    pub fn awaiting_transfer(asset: &WatchedAsset, limit: u32) -> Self {
        Self::pending(
            asset,
            TaskSet::TRANSFER_ATTEMPT,
            TaskSet::SEND_VERIFICATION,
            limit,
        )
    }

    /// Requests the confirmer picks up.
    pub fn awaiting_confirmation(asset: &WatchedAsset, limit: u32) -> Self {
        Self::pending(
            asset,
            TaskSet::CONFIRMATION,
            TaskSet::TRANSFER_ATTEMPT | TaskSet::SEND_VERIFICATION,
            limit,
        )
    }

    fn pending(asset: &WatchedAsset, set: TaskSet, not_set: TaskSet, limit: u32) -> Self {
        Self {
            asset: asset.id.clone(),
            reviewer: asset.owner.clone(),
            state: RequestState::Pending,
            pending_tasks: set,
            pending_tasks_not_set: not_set,
            limit,
            amount_digits: asset.trailing_digits,
        }
    }

    /// Whether `request` passes the asset, state and task filters.
    pub fn matches(&self, request: &WithdrawRequest) -> bool {
        request.asset == self.asset
            && request.state == self.state
            && request.pending_tasks.contains(self.pending_tasks)
            && !request.pending_tasks.intersects(self.pending_tasks_not_set)
    }

    /// Query-string encoding understood by the ledger API.
    pub fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("filter[state]".to_string(), self.state.code().to_string()),
            ("filter[reviewer]".to_string(), self.reviewer.clone()),
            (
                "filter[pending_tasks]".to_string(),
                self.pending_tasks.to_string(),
            ),
            (
                "filter[pending_tasks_not_set]".to_string(),
                self.pending_tasks_not_set.to_string(),
            ),
            ("filter[request_details.asset]".to_string(), self.asset.clone()),
            ("include".to_string(), "request_details".to_string()),
            ("page[limit]".to_string(), self.limit.to_string()),
        ]
    }
}

/// One page of a request listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPage {
    pub requests: Vec<WithdrawRequest>,
    /// Opaque cursor of the following page, when the ledger reported one.
    pub next: Option<String>,
}

/// Ledger capabilities the withdraw workers depend on.
pub trait RequestSource: Send + Sync {
    /// First page of requests matching `query`.
    fn list(
        &self,
        query: &RequestQuery,
    ) -> impl Future<Output = Result<RequestPage, LedgerError>> + Send;

    /// Page behind a cursor returned by a previous call.
    fn next(
        &self,
        query: &RequestQuery,
        cursor: &str,
    ) -> impl Future<Output = Result<RequestPage, LedgerError>> + Send;

    /// Sign and submit a review operation.
    ///
    /// With `wait_for_result` the call returns once the ledger applied or
    /// refused the transaction.
    fn submit(
        &self,
        op: &ReviewOp,
        wait_for_result: bool,
    ) -> impl Future<Output = Result<SubmitResult, SubmitError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use serde_json::json;

    fn asset(owner: &str) -> WatchedAsset {
        WatchedAsset {
            id: "USDT".to_string(),
            token: Address::ZERO,
            trailing_digits: 2,
            owner: owner.to_string(),
        }
    }

    fn request(tasks: TaskSet) -> WithdrawRequest {
        WithdrawRequest {
            id: 1,
            hash: "h".to_string(),
            asset: "USDT".to_string(),
            state: RequestState::Pending,
            amount: 1,
            pending_tasks: tasks,
            creator_details: json!({}),
            external_details: vec![],
        }
    }

    #[test]
    fn test_filters_never_overlap() {
        let transfer = RequestQuery::awaiting_transfer(&asset("G"), 10);
        let confirm = RequestQuery::awaiting_confirmation(&asset("G"), 10);

        for bits in 0..8u32 {
            let tasks = TaskSet::from_bits(bits << 11);
            let r = request(tasks);
            assert!(
                !(transfer.matches(&r) && confirm.matches(&r)),
                "both workers match {tasks}"
            );
        }
    }

    #[test]
    fn test_filter_matching() {
        let transfer = RequestQuery::awaiting_transfer(&asset("G"), 10);
        let confirm = RequestQuery::awaiting_confirmation(&asset("G"), 10);

        assert!(transfer.matches(&request(TaskSet::TRANSFER_ATTEMPT)));
        assert!(!transfer.matches(&request(TaskSet::SEND_VERIFICATION)));
        assert!(confirm.matches(&request(TaskSet::CONFIRMATION)));
        assert!(!confirm.matches(&request(TaskSet::SEND_VERIFICATION)));

        let mut other_asset = request(TaskSet::TRANSFER_ATTEMPT);
        other_asset.asset = "BTC".to_string();
        assert!(!transfer.matches(&other_asset));

        let mut rejected = request(TaskSet::TRANSFER_ATTEMPT);
        rejected.state = RequestState::PermanentlyRejected;
        assert!(!transfer.matches(&rejected));
    }

    #[test]
    fn test_query_params() {
        let query = RequestQuery::awaiting_confirmation(&asset("GOWNER"), 10);
        assert_eq!(query.amount_digits, 2);
        let params = query.to_params();
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("filter[state]"), Some("1"));
        assert_eq!(get("filter[reviewer]"), Some("GOWNER"));
        assert_eq!(get("filter[pending_tasks]"), Some("8192"));
        assert_eq!(get("filter[pending_tasks_not_set]"), Some("6144"));
        assert_eq!(get("filter[request_details.asset]"), Some("USDT"));
        assert_eq!(get("include"), Some("request_details"));
        assert_eq!(get("page[limit]"), Some("10"));
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(RequestState::from_code(1), Some(RequestState::Pending));
        assert_eq!(RequestState::from_code(5), Some(RequestState::PermanentlyRejected));
        assert_eq!(RequestState::from_code(9), None);
    }
}
