//! Pending-task mask of withdraw requests.
//!
//! The ledger stores a bitmask per request; the bridge owns three bits of
//! it. Business logic works with [`RequestStage`] and [`Transition`], and
//! only the review operation sees raw bits.

use crate::details::{AMOUNT_KEY, BLOCK_NUMBER_KEY, TX_HASH_KEY};
use alloy_primitives::{TxHash, U256};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::BitOr};
use thiserror::Error;

/// Set of pending task bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskSet(u32);

impl TaskSet {
    pub const EMPTY: Self = Self(0);
    /// Chain transfer not attempted yet.
    pub const TRANSFER_ATTEMPT: Self = Self(1 << 11);
    /// Transfer attempt in flight; the tx hash is not recorded yet.
    pub const SEND_VERIFICATION: Self = Self(1 << 12);
    /// Tx hash recorded; waiting for confirmations.
    pub const CONFIRMATION: Self = Self(1 << 13);
    /// All bits owned by the bridge.
    pub const BRIDGE: Self = Self(
        Self::TRANSFER_ATTEMPT.0 | Self::SEND_VERIFICATION.0 | Self::CONFIRMATION.0,
    );

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }
}

impl BitOr for TaskSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unexpected pending task combination {0}")]
pub struct UnexpectedTasks(pub TaskSet);

/// Position of a pending request in the bridge state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStage {
    AwaitingTransfer,
    AwaitingSendVerification,
    AwaitingConfirmation,
    /// No bridge task left; the approval is final.
    Completed,
}

impl RequestStage {
    pub const fn tasks(self) -> TaskSet {
        match self {
            Self::AwaitingTransfer => TaskSet::TRANSFER_ATTEMPT,
            Self::AwaitingSendVerification => TaskSet::SEND_VERIFICATION,
            Self::AwaitingConfirmation => TaskSet::CONFIRMATION,
            Self::Completed => TaskSet::EMPTY,
        }
    }

    /// Decode the bridge bits of a ledger mask. Bits outside
    /// [`TaskSet::BRIDGE`] belong to other reviewers and are ignored.
    pub fn from_tasks(tasks: TaskSet) -> Result<Self, UnexpectedTasks> {
        let bridge = tasks.intersection(TaskSet::BRIDGE);
        match bridge {
            TaskSet::TRANSFER_ATTEMPT => Ok(Self::AwaitingTransfer),
            TaskSet::SEND_VERIFICATION => Ok(Self::AwaitingSendVerification),
            TaskSet::CONFIRMATION => Ok(Self::AwaitingConfirmation),
            TaskSet::EMPTY => Ok(Self::Completed),
            other => Err(UnexpectedTasks(other)),
        }
    }
}

/// A forward move along the request state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Claim the request before touching the chain.
    Lock,
    /// Record the broadcast transfer.
    RecordTransfer { tx_hash: TxHash, amount: U256 },
    /// Finalize after enough confirmations.
    Confirm { block_number: u64 },
}

impl Transition {
    pub const fn from_stage(&self) -> RequestStage {
        match self {
            Self::Lock => RequestStage::AwaitingTransfer,
            Self::RecordTransfer { .. } => RequestStage::AwaitingSendVerification,
            Self::Confirm { .. } => RequestStage::AwaitingConfirmation,
        }
    }

    pub const fn to_stage(&self) -> RequestStage {
        match self {
            Self::Lock => RequestStage::AwaitingSendVerification,
            Self::RecordTransfer { .. } => RequestStage::AwaitingConfirmation,
            Self::Confirm { .. } => RequestStage::Completed,
        }
    }

    pub const fn tasks_to_add(&self) -> TaskSet {
        self.to_stage().tasks()
    }

    pub const fn tasks_to_remove(&self) -> TaskSet {
        self.from_stage().tasks()
    }

    /// Block appended to the request's external details.
    pub fn external_details(&self) -> serde_json::Value {
        match self {
            Self::Lock => serde_json::Value::Object(Default::default()),
            Self::RecordTransfer { tx_hash, amount } => serde_json::json!({
                TX_HASH_KEY: tx_hash.to_string(),
                AMOUNT_KEY: amount.to_string(),
            }),
            Self::Confirm { block_number } => serde_json::json!({
                BLOCK_NUMBER_KEY: block_number,
            }),
        }
    }
}
