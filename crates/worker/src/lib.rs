//! Withdraw workers.
//!
//! For every watched asset the [`Dispatcher`] runs an [`Initiator`], which
//! locks pending requests and sends the ERC20 payout, and a [`Confirmer`],
//! which approves a recorded payout once it has enough confirmations. The
//! two never talk to each other: a request only becomes visible to the
//! confirmer after the initiator committed its task bits on the ledger.

pub mod amount;
pub mod confirmer;
pub mod dispatcher;
pub mod feed;
pub mod initiator;
pub mod metrics;
pub mod reviewer;
pub mod runner;
pub mod transfer_log;

pub use confirmer::Confirmer;
pub use dispatcher::Dispatcher;
pub use initiator::Initiator;
pub use self::metrics::Metrics;
pub use runner::{BackoffPolicy, Exit, PollWorker};

use config::ServiceConfig;
use ledger::RejectReason;

/// What processing one request led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Payout sent and recorded.
    Transferred,
    /// Final approval submitted.
    Approved,
    Rejected(RejectReason),
    /// Not mined or not confirmed yet.
    Waiting,
    /// Nothing to do for this worker.
    Skipped,
}

impl Outcome {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Transferred => "transferred",
            Self::Approved => "approved",
            Self::Rejected(_) => "rejected",
            Self::Waiting => "waiting",
            Self::Skipped => "skipped",
        }
    }
}

/// Parameters shared by every worker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub page_limit: u32,
    /// Blocks required on top of the transfer block
    pub confirmations: u64,
    /// Retries of the ledger write recording a sent transfer
    pub record_retries: usize,
    pub policy: BackoffPolicy,
}

impl From<&ServiceConfig> for WorkerSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            page_limit: config.poll.page_limit,
            confirmations: config.chain.confirmations,
            record_retries: config.poll.record_retries,
            policy: BackoffPolicy::from(&config.poll),
        }
    }
}
