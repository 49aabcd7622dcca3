//! Transaction submitter: submits one write and waits for a terminal status.
//!
//! Writes from the same signer are serialized: a signer's lane is held from
//! submission until the write is confirmed or failed, so two writes of one
//! account are never in flight together. A write whose outcome is still
//! unknown when the wait ends (timeout, lost status polls) stays recorded on
//! the lane; the signer's next write first waits for it to settle and is
//! refused without writing if it does not. Writes from different signers
//! proceed independently.
//!
//! A write that fails to reach the ledger is not resubmitted, since it may
//! have been accepted. Status polls that fail transiently are retried up to
//! the poll retry budget.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::app::retry::RetryPolicy;
use crate::domain::{Address, FailureReason, SubmissionId, TxStatus, WriteRequest};
use crate::ports::{LedgerClient, LedgerError, Signer};

#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Upper bound on the wait for a terminal status.
    pub confirmation_timeout: Duration,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Backoff and budget for status polls that fail to reach the ledger.
    pub poll_retry: RetryPolicy,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            poll_retry: RetryPolicy {
                max_retries: 5,
                ..RetryPolicy::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed(SubmissionId),
    Failed(FailureReason),
}

pub fn failure_from_ledger(err: LedgerError) -> FailureReason {
    match err {
        LedgerError::Unreachable(message) => FailureReason::Infrastructure { message },
        LedgerError::Reverted(message) => FailureReason::Rejected { message },
        LedgerError::Unauthorized(message) => FailureReason::Unauthorized { message },
        LedgerError::UnknownSubmission(id) => FailureReason::Infrastructure {
            message: format!("ledger lost track of {id}"),
        },
    }
}

pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerClient>,
    config: SubmitterConfig,
    /// Per-signer lane, holding the write left unsettled by the last holder.
    lanes: Mutex<HashMap<Address, Arc<tokio::sync::Mutex<Option<SubmissionId>>>>>,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: SubmitterConfig) -> Self {
        Self {
            ledger,
            config,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    fn lane(&self, signer: Address) -> Arc<tokio::sync::Mutex<Option<SubmissionId>>> {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(signer)
            .or_default()
            .clone()
    }

    pub async fn submit(&self, request: &WriteRequest, signer: &dyn Signer) -> TxOutcome {
        let from = signer.address();
        let lane = self.lane(from);
        let mut unsettled = lane.lock().await;

        if let Some(previous) = *unsettled {
            info!(task = %request.task_id, tx = %previous, %from, "waiting for earlier write");
            if !settled(&self.wait(previous).await) {
                warn!(task = %request.task_id, tx = %previous, %from, "earlier write still unsettled");
                return TxOutcome::Failed(FailureReason::Infrastructure {
                    message: format!("signer {from} has unconfirmed {previous}"),
                });
            }
            *unsettled = None;
        }

        let pending = match self.ledger.write(request, signer).await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(task = %request.task_id, %from, error = %err, "write not accepted");
                return TxOutcome::Failed(failure_from_ledger(err));
            }
        };
        info!(
            task = %request.task_id,
            tx = %pending.submission_id,
            %from,
            nonce = pending.nonce,
            "submitted"
        );

        let outcome = self.wait(pending.submission_id).await;
        if !settled(&outcome) {
            *unsettled = Some(pending.submission_id);
        }
        outcome
    }

    /// Wait for `submission` to reach a terminal status, bounded by the
    /// confirmation timeout.
    async fn wait(&self, submission: SubmissionId) -> TxOutcome {
        let started = Instant::now();
        match tokio::time::timeout(
            self.config.confirmation_timeout,
            self.await_terminal(submission),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(tx = %submission, waited_ms, "confirmation timed out");
                TxOutcome::Failed(FailureReason::Timeout { waited_ms })
            }
        }
    }

    async fn await_terminal(&self, submission: SubmissionId) -> TxOutcome {
        let mut failed_polls = 0;
        loop {
            match self.ledger.status(&submission).await {
                Ok(TxStatus::Confirmed) => {
                    debug!(tx = %submission, "confirmed");
                    return TxOutcome::Confirmed(submission);
                }
                Ok(TxStatus::Failed { reason }) => {
                    return TxOutcome::Failed(FailureReason::Rejected { message: reason });
                }
                Ok(TxStatus::Submitted) => {
                    failed_polls = 0;
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(err) if err.is_retryable() => {
                    failed_polls += 1;
                    if !self.config.poll_retry.should_retry(failed_polls) {
                        return TxOutcome::Failed(failure_from_ledger(err));
                    }
                    let delay = self.config.poll_retry.next_delay(failed_polls);
                    warn!(tx = %submission, attempt = failed_polls, ?delay, error = %err, "status poll failed");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return TxOutcome::Failed(failure_from_ledger(err)),
            }
        }
    }
}

/// Whether the ledger reported a terminal status for the write.
///
/// # Design note
/// A timeout or exhausted status polls leave the write's fate unknown; only
/// `Confirmed` and a ledger-reported failure release the lane.
fn settled(outcome: &TxOutcome) -> bool {
    matches!(
        outcome,
        TxOutcome::Confirmed(_) | TxOutcome::Failed(FailureReason::Rejected { .. })
    )
}
