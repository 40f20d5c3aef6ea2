//! Ledger side of the bridge.
//!
//! Withdraw requests move through a small task-bit protocol: the pending
//! task mask selects which worker picks a request up, and two review
//! operations (partial approval and permanent rejection) are the only ways
//! to change it. This crate provides:
//! - The task mask and its stage/transition model
//! - The withdraw request model and query filters
//! - The [`RequestSource`] capability and its HTTP implementation
//! - Review operations and their submission through a signer proxy
//! - The asset watch list producing add/remove events

pub mod asset;
pub mod details;
pub mod http;
pub mod proxy;
pub mod request;
pub mod review;
pub mod task;
pub mod watchlist;

pub use asset::{AssetSource, WatchedAsset};
pub use http::LedgerClient;
pub use proxy::SignerProxy;
pub use request::{
    LedgerError, RequestPage, RequestQuery, RequestSource, RequestState, WithdrawRequest,
};
pub use review::{RejectReason, ReviewAction, ReviewOp, SubmitError, SubmitResult};
pub use task::{RequestStage, TaskSet, Transition, UnexpectedTasks};
pub use watchlist::{AssetEvents, AssetWatcher};
