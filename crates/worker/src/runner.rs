//! Poll loop shared by the initiator and the confirmer.

use crate::Metrics;
use config::PollConfig;
use std::{future::Future, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One pass over the requests a worker is responsible for.
pub trait PollWorker: Send {
    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Fetch one page and process it.
    ///
    /// An error means the page itself could not be fetched; per-request
    /// failures are handled inside the cycle.
    fn poll_once(
        &mut self,
        token: &CancellationToken,
    ) -> impl Future<Output = eyre::Result<()>> + Send;
}

/// Timing of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Pause after a successful cycle
    pub period: Duration,
    /// Pause after a failed cycle
    pub retry_delay: Duration,
    /// Continuous failure time after which the loop gives up
    pub max_failure_window: Duration,
}

impl From<&PollConfig> for BackoffPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            period: config.period(),
            retry_delay: config.retry_delay(),
            max_failure_window: config.max_failure_window(),
        }
    }
}

/// Why a poll loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Cancelled,
    /// Cycles kept failing for the whole failure window.
    GaveUp,
}

/// Drive `worker` until `token` is cancelled or the failure window runs out.
///
/// Cancellation is checked before every cycle and interrupts the pause
/// between cycles; a cycle already in flight is allowed to finish.
pub async fn run<W: PollWorker>(
    mut worker: W,
    policy: BackoffPolicy,
    token: CancellationToken,
    metrics: Metrics,
) -> Exit {
    let name = worker.name();
    info!(worker = name, "Worker started");

    let mut failing_since: Option<Instant> = None;
    let exit = loop {
        if token.is_cancelled() {
            break Exit::Cancelled;
        }

        let started = Instant::now();
        let result = worker.poll_once(&token).await;
        metrics.record_cycle(name, result.is_ok(), started.elapsed());

        let pause = match result {
            Ok(()) => {
                if failing_since.take().is_some() {
                    info!(worker = name, "Worker recovered");
                }
                debug!(worker = name, "Cycle finished");
                policy.period
            }
            Err(err) => {
                let since = *failing_since.get_or_insert(started);
                if since.elapsed() >= policy.max_failure_window {
                    error!(
                        worker = name,
                        error = ?err,
                        failing_for = ?since.elapsed(),
                        "Worker giving up after continuous failures"
                    );
                    break Exit::GaveUp;
                }
                warn!(worker = name, error = ?err, retry_in = ?policy.retry_delay, "Cycle failed");
                policy.retry_delay
            }
        };

        tokio::select! {
            _ = token.cancelled() => break Exit::Cancelled,
            _ = tokio::time::sleep(pause) => {}
        }
    };

    info!(worker = name, ?exit, "Worker stopped");
    exit
}
