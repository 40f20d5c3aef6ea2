//! Confirmer: finalizes requests whose transfer has been recorded.

use crate::{
    feed::RequestFeed, reviewer::Reviewer, runner::PollWorker, transfer_log::has_transfer,
    Metrics, Outcome, WorkerSettings,
};
use alloy_primitives::{Address, TxHash, U256};
use client::ChainClient;
use eyre::WrapErr;
use ledger::{
    details::{CreatorDetails, TransferRecord},
    RejectReason, RequestQuery, RequestSource, RequestStage, Transition, WatchedAsset,
    WithdrawRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const NAME: &str = "confirmer";

pub struct Confirmer<S, C> {
    reviewer: Reviewer<S>,
    chain: C,
    asset: WatchedAsset,
    confirmations: u64,
    feed: RequestFeed,
    metrics: Metrics,
}

impl<S, C> Confirmer<S, C>
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
        let query = RequestQuery::awaiting_confirmation(&asset, settings.page_limit);
        Self {
            reviewer: Reviewer::new(source, asset.owner.clone()),
            chain,
            confirmations: settings.confirmations,
            feed: RequestFeed::new(query),
            asset,
            metrics,
        }
    }

    /// Approve a recorded transfer once it is buried deep enough, or reject
    /// it when the chain disagrees with the record.
    pub async fn process(&self, request: &WithdrawRequest) -> eyre::Result<Outcome> {
        match request.stage() {
            Ok(RequestStage::AwaitingConfirmation) => {}
            stage => {
                debug!(request_id = request.id, ?stage, "Request not awaiting confirmation");
                return Ok(Outcome::Skipped);
            }
        }

        let Some(record) = TransferRecord::latest(&request.external_details) else {
            warn!(request_id = request.id, "No transfer recorded in external details");
            return self
                .reviewer
                .reject(request, RejectReason::InvalidExternalDetails)
                .await;
        };
        let Ok(tx_hash) = record.eth_tx_hash.parse::<TxHash>() else {
            warn!(request_id = request.id, tx_hash = %record.eth_tx_hash, "Recorded tx hash is invalid");
            return self.reviewer.reject(request, RejectReason::InvalidTxHash).await;
        };
        let Ok(amount) = record.amount.parse::<U256>() else {
            warn!(request_id = request.id, amount = %record.amount, "Recorded amount is invalid");
            return self
                .reviewer
                .reject(request, RejectReason::InvalidExternalDetails)
                .await;
        };

        let Some(receipt) = self
            .chain
            .transaction_receipt(tx_hash)
            .await
            .wrap_err_with(|| format!("failed to get receipt of {tx_hash}"))?
        else {
            debug!(request_id = request.id, %tx_hash, "Transfer not mined yet");
            return Ok(Outcome::Waiting);
        };

        if !receipt.success {
            info!(request_id = request.id, %tx_hash, "Transfer transaction failed, rejecting request");
            return self.reviewer.reject(request, RejectReason::TransactionFailed).await;
        }

        let target = target_address(request);
        let transferred = target
            .is_some_and(|to| has_transfer(&receipt.logs, self.asset.token, to, amount));
        if !transferred {
            warn!(
                request_id = request.id,
                %tx_hash,
                target = ?target,
                %amount,
                "No matching transfer log in receipt"
            );
            return self.reviewer.reject(request, RejectReason::TransferFailed).await;
        }

        let depth_block = receipt.block_number.saturating_add(self.confirmations);
        let buried = self
            .chain
            .block_exists(depth_block)
            .await
            .wrap_err_with(|| format!("failed to get block {depth_block}"))?;
        if !buried {
            debug!(
                request_id = request.id,
                %tx_hash,
                block = receipt.block_number,
                waiting_for = depth_block,
                "Not enough confirmations yet"
            );
            return Ok(Outcome::Waiting);
        }

        let confirm = Transition::Confirm {
            block_number: receipt.block_number,
        };
        self.reviewer
            .advance(request, &confirm)
            .await
            .wrap_err_with(|| format!("failed to approve request {}", request.id))?;

        info!(
            asset = %self.asset.id,
            request_id = request.id,
            %tx_hash,
            block = receipt.block_number,
            "Withdraw request approved"
        );
        Ok(Outcome::Approved)
    }
}

impl<S, C> PollWorker for Confirmer<S, C>
where
    S: RequestSource,
    C: ChainClient,
{
    fn name(&self) -> &'static str {
        NAME
    }

    async fn poll_once(&mut self, token: &CancellationToken) -> eyre::Result<()> {
        let requests = self
            .feed
            .next_page(self.reviewer.source())
            .await
            .wrap_err("failed to fetch requests awaiting confirmation")?;
        debug!(asset = %self.asset.id, count = requests.len(), "Fetched requests awaiting confirmation");

        for request in &requests {
            if token.is_cancelled() {
                break;
            }
            match self.process(request).await {
                Ok(outcome) => self.metrics.record_outcome(NAME, outcome),
                Err(err) => {
                    self.metrics.record_failure(NAME);
                    warn!(asset = %self.asset.id, request_id = request.id, error = ?err, "Failed to confirm withdraw request");
                }
            }
        }
        Ok(())
    }
}

fn target_address(request: &WithdrawRequest) -> Option<Address> {
    CreatorDetails::parse(&request.creator_details)
        .ok()?
        .target_address
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{settings, watched_asset, withdraw_request, MockChain, MockLedger},
        transfer_log::transfer_log,
    };
    use client::ChainReceipt;
    use ledger::{SubmitError, TaskSet};
    use serde_json::json;

    const TARGET: Address = Address::repeat_byte(0xaa);
    const TX: TxHash = TxHash::repeat_byte(0x11);

    fn confirmer(ledger: &MockLedger, chain: &MockChain) -> Confirmer<MockLedger, MockChain> {
        Confirmer::new(
            ledger.clone(),
            chain.clone(),
            watched_asset("USDT"),
            &settings(),
            Metrics::new(),
        )
    }

    /// A request as left behind by the initiator.
    fn recorded(id: u64, amount: &str) -> WithdrawRequest {
        let mut request = withdraw_request(id, TaskSet::CONFIRMATION);
        request.creator_details = json!({ "address": TARGET.to_string() });
        request.external_details = vec![
            json!({}),
            json!({ "eth_tx_hash": TX.to_string(), "amount": amount }),
        ];
        request
    }

    fn receipt(block_number: u64, success: bool, value: u64) -> ChainReceipt {
        let token = watched_asset("USDT").token;
        ChainReceipt {
            tx_hash: TX,
            block_number,
            success,
            logs: vec![transfer_log(token, Address::repeat_byte(0x01), TARGET, U256::from(value))],
        }
    }

    #[tokio::test]
    async fn test_unmined_transfer_waits() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();
        ledger.insert(recorded(1, "500"));

        let outcome = confirmer(&ledger, &chain).process(&ledger.get(1)).await.unwrap();
        assert_eq!(outcome, Outcome::Waiting);
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_error_is_transient() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();
        chain.fail_reads(true);
        ledger.insert(recorded(1, "500"));

        assert!(confirmer(&ledger, &chain).process(&ledger.get(1)).await.is_err());
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_depth_gating() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();
        chain.insert_receipt(receipt(100, true, 500));
        chain.set_head(100 + settings().confirmations - 1);
        ledger.insert(recorded(1, "500"));

        let confirmer = confirmer(&ledger, &chain);
        assert_eq!(confirmer.process(&ledger.get(1)).await.unwrap(), Outcome::Waiting);
        assert_eq!(ledger.get(1).pending_tasks, TaskSet::CONFIRMATION);
        assert_eq!(chain.probed_blocks(), vec![100 + settings().confirmations]);

        chain.set_head(100 + settings().confirmations);
        assert_eq!(confirmer.process(&ledger.get(1)).await.unwrap(), Outcome::Approved);

        let approved = ledger.get(1);
        assert!(approved.pending_tasks.is_empty());
        assert_eq!(approved.external_details.last(), Some(&json!({ "eth_block_number": 100 })));
        assert_eq!(
            ledger.task_history(1),
            vec![TaskSet::CONFIRMATION, TaskSet::EMPTY]
        );
    }

    #[tokio::test]
    async fn test_failed_transaction_rejected() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();
        chain.insert_receipt(receipt(100, false, 500));
        ledger.insert(recorded(1, "500"));

        let outcome = confirmer(&ledger, &chain).process(&ledger.get(1)).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(RejectReason::TransactionFailed));
        assert_eq!(ledger.rejection_reason(1).as_deref(), Some("Transaction failed"));
    }

    #[tokio::test]
    async fn test_removed_log_rejected() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();
        let mut reorged = receipt(100, true, 500);
        reorged.logs[0].removed = true;
        chain.insert_receipt(reorged);
        chain.set_head(1_000);
        ledger.insert(recorded(1, "500"));

        let outcome = confirmer(&ledger, &chain).process(&ledger.get(1)).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(RejectReason::TransferFailed));
    }

    #[tokio::test]
    async fn test_value_mismatch_rejected() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();
        chain.insert_receipt(receipt(100, true, 499));
        chain.set_head(1_000);
        ledger.insert(recorded(1, "500"));

        let outcome = confirmer(&ledger, &chain).process(&ledger.get(1)).await.unwrap();
        assert_eq!(outcome, Outcome::Rejected(RejectReason::TransferFailed));
        assert!(chain.probed_blocks().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_external_details() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();

        let mut no_hash = recorded(1, "500");
        no_hash.external_details = vec![json!({}), json!({ "amount": "500" })];
        let mut bad_hash = recorded(2, "500");
        bad_hash.external_details = vec![json!({ "eth_tx_hash": "0x1234", "amount": "500" })];
        let bad_amount = recorded(3, "five hundred");
        for r in [no_hash, bad_hash, bad_amount] {
            ledger.insert(r);
        }

        let confirmer = confirmer(&ledger, &chain);
        assert_eq!(
            confirmer.process(&ledger.get(1)).await.unwrap(),
            Outcome::Rejected(RejectReason::InvalidExternalDetails)
        );
        assert_eq!(
            confirmer.process(&ledger.get(2)).await.unwrap(),
            Outcome::Rejected(RejectReason::InvalidTxHash)
        );
        assert_eq!(
            confirmer.process(&ledger.get(3)).await.unwrap(),
            Outcome::Rejected(RejectReason::InvalidExternalDetails)
        );
        assert_eq!(chain.receipt_lookups(), 0);
    }

    #[tokio::test]
    async fn test_refused_rejection_is_not_an_error() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();
        chain.insert_receipt(receipt(100, false, 500));
        ledger.insert(recorded(1, "500"));
        ledger.script_submissions(vec![Some(SubmitError::Refused {
            code: -32010,
            message: "transaction failed".to_string(),
            tx_code: Some("tx_failed".to_string()),
            op_codes: vec!["op_request_not_found".to_string()],
        })]);

        let outcome = confirmer(&ledger, &chain).process(&ledger.get(1)).await.unwrap();
        assert_eq!(outcome, Outcome::Skipped);
    }

    #[tokio::test]
    async fn test_poll_approves_page() {
        let ledger = MockLedger::default();
        let chain = MockChain::default();
        chain.insert_receipt(receipt(100, true, 500));
        chain.set_head(1_000);
        ledger.insert(recorded(1, "500"));
        // Not yet locked by the initiator: invisible to the confirmer.
        ledger.insert(withdraw_request(2, TaskSet::TRANSFER_ATTEMPT));

        confirmer(&ledger, &chain)
            .poll_once(&CancellationToken::new())
            .await
            .unwrap();

        assert!(ledger.get(1).pending_tasks.is_empty());
        assert_eq!(ledger.get(2).pending_tasks, TaskSet::TRANSFER_ATTEMPT);
        assert_eq!(ledger.submissions().len(), 1);
    }
}
