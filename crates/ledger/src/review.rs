//! Review operations: the only way the bridge mutates a withdraw request.
//!
//! Both carry the request's content hash, so the ledger refuses them when
//! somebody else changed the request in between.

use crate::{
    request::WithdrawRequest,
    task::{TaskSet, Transition},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Machine-readable reason attached to a permanent rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    InvalidDetails,
    InvalidTargetAddress,
    AmountTooSmall,
    AmountTooLarge,
    TransferFailed,
    InvalidExternalDetails,
    InvalidTxHash,
    TransactionFailed,
}

impl RejectReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidDetails => "Invalid creator details",
            Self::InvalidTargetAddress => "Invalid target address",
            Self::AmountTooSmall => "Withdrawn amount too small",
            Self::AmountTooLarge => "Withdrawn amount too large",
            Self::TransferFailed => "Transfer failed",
            Self::InvalidExternalDetails => "Invalid external details",
            Self::InvalidTxHash => "Invalid ethereum transaction hash",
            Self::TransactionFailed => "Transaction failed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewAction {
    /// Partial approval: move task bits and append an external-details block.
    Approve {
        tasks_to_add: TaskSet,
        tasks_to_remove: TaskSet,
        external_details: Value,
    },
    /// Terminal rejection; clears every pending task.
    PermanentReject { reason: String },
}

/// Review of one withdraw request, signed on behalf of `source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewOp {
    pub request_id: u64,
    pub request_hash: String,
    pub source: String,
    #[serde(flatten)]
    pub action: ReviewAction,
}

impl ReviewOp {
    pub fn approve_partially(
        request: &WithdrawRequest,
        source: &str,
        tasks_to_add: TaskSet,
        tasks_to_remove: TaskSet,
        external_details: Value,
    ) -> Self {
        Self {
            request_id: request.id,
            request_hash: request.hash.clone(),
            source: source.to_string(),
            action: ReviewAction::Approve {
                tasks_to_add,
                tasks_to_remove,
                external_details,
            },
        }
    }

    /// Partial approval moving the request along `transition`.
    pub fn transition(request: &WithdrawRequest, source: &str, transition: &Transition) -> Self {
        Self::approve_partially(
            request,
            source,
            transition.tasks_to_add(),
            transition.tasks_to_remove(),
            transition.external_details(),
        )
    }

    pub fn permanently_reject(request: &WithdrawRequest, source: &str, reason: RejectReason) -> Self {
        Self {
            request_id: request.id,
            request_hash: request.hash.clone(),
            source: source.to_string(),
            action: ReviewAction::PermanentReject {
                reason: reason.as_str().to_string(),
            },
        }
    }
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitResult {
    pub tx_hash: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The submission never got a verdict (network, proxy down, timeout).
    #[error("submission transport error: {0}")]
    Transport(String),

    /// The ledger refused the transaction.
    #[error("transaction refused ({code}): {message}; tx_code={tx_code:?} op_codes={op_codes:?}")]
    Refused {
        code: i64,
        message: String,
        tx_code: Option<String>,
        op_codes: Vec<String>,
    },
}

impl SubmitError {
    /// The ledger looked at the transaction and said no; resubmitting the
    /// same operation will not help.
    pub const fn is_refused(&self) -> bool {
        matches!(self, Self::Refused { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestState;
    use serde_json::json;

    fn request() -> WithdrawRequest {
        WithdrawRequest {
            id: 42,
            hash: "deadbeef".to_string(),
            asset: "USDT".to_string(),
            state: RequestState::Pending,
            amount: 100,
            pending_tasks: TaskSet::TRANSFER_ATTEMPT,
            creator_details: json!({}),
            external_details: vec![],
        }
    }

    #[test]
    fn test_lock_op_wire_format() {
        let op = ReviewOp::transition(&request(), "GOWNER", &Transition::Lock);
        let wire = serde_json::to_value(&op).unwrap();

        assert_eq!(
            wire,
            json!({
                "request_id": 42,
                "request_hash": "deadbeef",
                "source": "GOWNER",
                "action": "approve",
                "tasks_to_add": 4096,
                "tasks_to_remove": 2048,
                "external_details": {},
            })
        );
    }

    #[test]
    fn test_reject_op_wire_format() {
        let op = ReviewOp::permanently_reject(&request(), "GOWNER", RejectReason::AmountTooSmall);
        let wire = serde_json::to_value(&op).unwrap();

        assert_eq!(wire["action"], "permanent_reject");
        assert_eq!(wire["reason"], "Withdrawn amount too small");
        assert_eq!(wire["request_hash"], "deadbeef");
    }

    #[test]
    fn test_refused_is_not_transport() {
        let refused = SubmitError::Refused {
            code: -32000,
            message: "tx failed".to_string(),
            tx_code: Some("tx_failed".to_string()),
            op_codes: vec!["op_invalid_hash".to_string()],
        };
        assert!(refused.is_refused());
        assert!(!SubmitError::Transport("timeout".to_string()).is_refused());
    }
}
