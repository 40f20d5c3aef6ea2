//! Prometheus metrics of the withdraw workers.
//!
//! All metrics are recorded through the [`Metrics`] handle; the exporter is
//! installed by the binary.

use crate::Outcome;
use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Handle for recording worker metrics.
///
/// Descriptions are registered with the global registry on creation.
#[derive(Debug, Clone)]
pub struct Metrics {
    _private: (),
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::register_descriptions();
        Self { _private: () }
    }

    fn register_descriptions() {
        // Poll cycles
        describe_counter!(
            "withdrawer_cycles_total",
            "Poll cycles executed, by worker and result"
        );
        describe_histogram!(
            "withdrawer_cycle_duration_seconds",
            "Duration of each poll cycle in seconds"
        );

        // Requests
        describe_counter!(
            "withdrawer_requests_total",
            "Withdraw requests handled, by worker and outcome"
        );
        describe_counter!(
            "withdrawer_request_failures_total",
            "Withdraw requests left unchanged after a transient failure"
        );
        describe_counter!(
            "withdrawer_transfers_total",
            "ERC20 payout transfers broadcast"
        );
        describe_counter!(
            "withdrawer_approvals_total",
            "Withdraw requests approved after confirmation"
        );
        describe_counter!(
            "withdrawer_rejections_total",
            "Withdraw requests permanently rejected, by reason"
        );
        describe_counter!(
            "withdrawer_partial_commits_total",
            "Transfers broadcast whose tx hash could not be recorded on the ledger"
        );

        // Lifecycle
        describe_gauge!(
            "withdrawer_active_assets",
            "Assets with a running worker pair"
        );
    }

    pub fn record_cycle(&self, worker: &'static str, success: bool, duration: Duration) {
        let result = if success { "success" } else { "failure" };
        counter!("withdrawer_cycles_total", "worker" => worker, "result" => result).increment(1);
        histogram!("withdrawer_cycle_duration_seconds", "worker" => worker)
            .record(duration.as_secs_f64());
    }

    pub fn record_outcome(&self, worker: &'static str, outcome: Outcome) {
        counter!("withdrawer_requests_total", "worker" => worker, "outcome" => outcome.label())
            .increment(1);

        match outcome {
            Outcome::Transferred => counter!("withdrawer_transfers_total").increment(1),
            Outcome::Approved => counter!("withdrawer_approvals_total").increment(1),
            Outcome::Rejected(reason) => {
                counter!("withdrawer_rejections_total", "reason" => reason.as_str()).increment(1);
            }
            Outcome::Waiting | Outcome::Skipped => {}
        }
    }

    pub fn record_failure(&self, worker: &'static str) {
        counter!("withdrawer_request_failures_total", "worker" => worker).increment(1);
    }

    /// A transfer went out but its ledger record did not.
    pub fn record_partial_commit(&self) {
        counter!("withdrawer_partial_commits_total").increment(1);
    }

    pub fn set_active_assets(&self, count: usize) {
        gauge!("withdrawer_active_assets").set(count as f64);
    }
}
