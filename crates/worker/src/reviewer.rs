use crate::Outcome;
use eyre::WrapErr;
use ledger::{RejectReason, RequestSource, ReviewOp, SubmitError, Transition, WithdrawRequest};
use tracing::{info, warn};

/// Submits review operations for one asset owner.
#[derive(Debug, Clone)]
pub struct Reviewer<S> {
    source: S,
    owner: String,
}

impl<S: RequestSource> Reviewer<S> {
    pub fn new(source: S, owner: impl Into<String>) -> Self {
        Self {
            source,
            owner: owner.into(),
        }
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Apply `transition` as a partial approval and wait for the ledger.
    pub async fn advance(
        &self,
        request: &WithdrawRequest,
        transition: &Transition,
    ) -> Result<(), SubmitError> {
        let op = ReviewOp::transition(request, &self.owner, transition);
        let result = self.source.submit(&op, true).await?;

        info!(
            request_id = request.id,
            from = ?transition.from_stage(),
            to = ?transition.to_stage(),
            ledger_tx = %result.tx_hash,
            "Request advanced"
        );
        Ok(())
    }

    /// Permanently reject `request`.
    ///
    /// A refusal means the request already left the pending state, so it is
    /// logged and reported as skipped.
    pub async fn reject(
        &self,
        request: &WithdrawRequest,
        reason: RejectReason,
    ) -> eyre::Result<Outcome> {
        let op = ReviewOp::permanently_reject(request, &self.owner, reason);
        match self.source.submit(&op, true).await {
            Ok(result) => {
                info!(
                    request_id = request.id,
                    %reason,
                    ledger_tx = %result.tx_hash,
                    "Request permanently rejected"
                );
                Ok(Outcome::Rejected(reason))
            }
            Err(err) if err.is_refused() => {
                warn!(
                    request_id = request.id,
                    %reason,
                    error = %err,
                    "Rejection refused, treating request as already terminal"
                );
                Ok(Outcome::Skipped)
            }
            Err(err) => Err(err).wrap_err_with(|| format!("failed to reject request {}", request.id)),
        }
    }
}
