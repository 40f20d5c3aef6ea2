//! Initiator: pays out requests awaiting a transfer attempt.
//!
//! Every request is locked on the ledger before the chain is touched, so a
//! transfer is attempted at most once whatever happens afterwards.

use crate::{
    amount::rescale, feed::RequestFeed, reviewer::Reviewer, runner::PollWorker, Metrics, Outcome,
    WorkerSettings,
};
use alloy_primitives::{Address, TxHash, U256};
use client::ChainClient;
use eyre::WrapErr;
use ledger::{
    details::CreatorDetails, RejectReason, RequestQuery, RequestSource, RequestStage, Transition,
    WatchedAsset, WithdrawRequest,
};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NAME: &str = "initiator";

pub struct Initiator<S, C> {
    reviewer: Reviewer<S>,
    chain: C,
    asset: WatchedAsset,
    /// Token precision, read from the contract on first use.
    decimals: OnceCell<u8>,
    feed: RequestFeed,
    record_retries: usize,
    record_delay: Duration,
    metrics: Metrics,
}

impl<S, C> Initiator<S, C>
where
    S: RequestSource,
    C: ChainClient,
{
    pub fn new(
        source: S,
        chain: C,
        asset: WatchedAsset,
        settings: &WorkerSettings,
        metrics: Metrics,
    ) -> Self {
        let query = RequestQuery::awaiting_transfer(&asset, settings.page_limit);
        Self {
            reviewer: Reviewer::new(source, asset.owner.clone()),
            chain,
            decimals: OnceCell::new(),
            feed: RequestFeed::new(query),
            record_retries: settings.record_retries,
            record_delay: settings.policy.retry_delay,
            asset,
            metrics,
        }
    }

    /// Drive one request from `AwaitingTransfer` to `AwaitingConfirmation`.
    pub async fn process(&self, request: &WithdrawRequest) -> eyre::Result<Outcome> {
        match request.stage() {
            Ok(RequestStage::AwaitingTransfer) => {}
            stage => {
                debug!(request_id = request.id, ?stage, "Request not awaiting transfer");
                return Ok(Outcome::Skipped);
            }
        }

        let details = match CreatorDetails::parse(&request.creator_details) {
            Ok(details) => details,
            Err(err) => {
                warn!(request_id = request.id, error = %err, "Unable to parse creator details");
                return self.reviewer.reject(request, RejectReason::InvalidDetails).await;
            }
        };
        let target: Address = match details.target_address.parse() {
            Ok(target) => target,
            Err(err) => {
                warn!(
                    request_id = request.id,
                    address = %details.target_address,
                    error = %err,
                    "Invalid target address"
                );
                return self
                    .reviewer
                    .reject(request, RejectReason::InvalidTargetAddress)
                    .await;
            }
        };

        // Resolved before locking: a failed lookup must leave the request pending.
        let decimals = self.decimals().await?;

        self.reviewer
            .advance(request, &Transition::Lock)
            .await
            .wrap_err_with(|| format!("failed to lock request {}", request.id))?;

        let amount = match rescale(request.amount, self.asset.trailing_digits, decimals) {
            Some(amount) if !amount.is_zero() => amount,
            Some(_) => {
                warn!(request_id = request.id, amount = request.amount, "Amount rounds to zero on chain");
                return self.reviewer.reject(request, RejectReason::AmountTooSmall).await;
            }
            None => {
                warn!(request_id = request.id, amount = request.amount, "Amount overflows on chain");
                return self.reviewer.reject(request, RejectReason::AmountTooLarge).await;
            }
        };

        let tx_hash = match self.chain.transfer(self.asset.token, target, amount).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                error!(request_id = request.id, error = %err, "Transfer failed, rejecting request");
                return self.reviewer.reject(request, RejectReason::TransferFailed).await;
            }
        };
        info!(request_id = request.id, %tx_hash, %target, %amount, "Transfer sent");

        self.record(request, tx_hash, amount).await?;
        Ok(Outcome::Transferred)
    }

    async fn decimals(&self) -> eyre::Result<u8> {
        let decimals = self
            .decimals
            .get_or_try_init(|| self.chain.decimals(self.asset.token))
            .await
            .wrap_err_with(|| format!("failed to load decimals of token {}", self.asset.token))?;
        Ok(*decimals)
    }

    /// Record the broadcast transfer, retrying transport failures.
    async fn record(&self, request: &WithdrawRequest, tx_hash: TxHash, amount: U256) -> eyre::Result<()> {
        let transition = &Transition::RecordTransfer { tx_hash, amount };
        let strategy = FixedInterval::new(self.record_delay).take(self.record_retries);

        let result = RetryIf::spawn(
            strategy,
            || async move {
                self.reviewer
                    .advance(request, transition)
                    .await
                    .inspect_err(|err| {
                        warn!(request_id = request.id, %tx_hash, error = %err, "Failed to record transfer");
                    })
            },
            |err: &ledger::SubmitError| !err.is_refused(),
        )
        .await;

        if let Err(err) = result {
            self.metrics.record_partial_commit();
            error!(
                request_id = request.id,
                %tx_hash,
                %amount,
                error = %err,
                "Transfer sent but not recorded, request needs manual reconciliation"
            );
            return Err(err).wrap_err_with(|| format!("failed to record transfer {tx_hash}"));
        }
        Ok(())
    }
}

impl<S, C> PollWorker for Initiator<S, C>
where
    S: RequestSource,
    C: ChainClient,
{
    fn name(&self) -> &'static str {
        NAME
    }

    async fn poll_once(&mut self, token: &CancellationToken) -> eyre::Result<()> {
        let decimals = self.decimals().await?;
        let requests = self
            .feed
            .next_page(self.reviewer.source())
            .await
            .wrap_err("failed to fetch requests awaiting transfer")?;
        debug!(asset = %self.asset.id, count = requests.len(), decimals, "Fetched requests awaiting transfer");

        for request in &requests {
            if token.is_cancelled() {
                break;
            }
            match self.process(request).await {
                Ok(outcome) => self.metrics.record_outcome(NAME, outcome),
                Err(err) => {
                    self.metrics.record_failure(NAME);
                    warn!(asset = %self.asset.id, request_id = request.id, error = ?err, "Failed to process withdraw request");
                }
            }
        }
        Ok(())
    }
}
