//! Task and transaction states.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{SubmissionId, TaskId};

/// Lifecycle position of a task within one run.
///
/// ```text
/// Pending -> Evaluating -> Skipped
///                       -> Submitting -> Applied
///                                     -> Failed
///         -> Failed (dependency failed / cancelled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Evaluating,
    Submitting,
    Skipped,
    Applied,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Skipped | TaskState::Applied | TaskState::Failed)
    }

    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Evaluating)
                | (Pending, Failed)
                | (Evaluating, Skipped)
                | (Evaluating, Submitting)
                | (Evaluating, Failed)
                | (Submitting, Applied)
                | (Submitting, Failed)
        )
    }

    /// Move to `next`, refusing edges outside the lifecycle.
    pub fn advance(&mut self, next: TaskState) -> Result<(), IllegalTransition> {
        if !self.can_transition_to(next) {
            return Err(IllegalTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal task transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: TaskState,
    pub to: TaskState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The desired state already holds.
    AlreadySatisfied,
    /// The task's precondition does not hold for the current ledger state.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// A prerequisite failed; this task was never attempted.
    DependencyFailed { task: TaskId },
    /// No terminal status within the confirmation window.
    Timeout { waited_ms: u64 },
    /// The ledger refused or reverted the write.
    Rejected { message: String },
    /// The signer lacks authority for the write.
    Unauthorized { message: String },
    /// The ledger stayed unreachable past the retry budget.
    Infrastructure { message: String },
    /// The guard could not be evaluated (missing deployment, bad operand).
    Evaluation { message: String },
    /// The run was cancelled before this task started.
    Cancelled,
}

impl FailureReason {
    /// False for failures that are only a consequence of another task's
    /// failure or of cancellation.
    pub fn is_root_cause(&self) -> bool {
        !matches!(
            self,
            FailureReason::DependencyFailed { .. } | FailureReason::Cancelled
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::DependencyFailed { task } => write!(f, "dependency {task} failed"),
            FailureReason::Timeout { waited_ms } => {
                write!(f, "not confirmed within {waited_ms}ms")
            }
            FailureReason::Rejected { message } => write!(f, "rejected: {message}"),
            FailureReason::Unauthorized { message } => write!(f, "unauthorized: {message}"),
            FailureReason::Infrastructure { message } => write!(f, "infrastructure: {message}"),
            FailureReason::Evaluation { message } => write!(f, "evaluation: {message}"),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal outcome of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Skipped { reason: SkipReason },
    Applied { tx: SubmissionId },
    Failed { reason: FailureReason },
}

impl TaskStatus {
    pub fn state(&self) -> TaskState {
        match self {
            TaskStatus::Skipped { .. } => TaskState::Skipped,
            TaskStatus::Applied { .. } => TaskState::Applied,
            TaskStatus::Failed { .. } => TaskState::Failed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskStatus::Failed { .. })
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            TaskStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Skipped {
                reason: SkipReason::AlreadySatisfied,
            } => f.write_str("skipped (already satisfied)"),
            TaskStatus::Skipped {
                reason: SkipReason::NotApplicable,
            } => f.write_str("skipped (not applicable)"),
            TaskStatus::Applied { tx } => write!(f, "applied ({tx})"),
            TaskStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Ledger-side status of a submitted write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    Submitted,
    Confirmed,
    Failed { reason: String },
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Submitted)
    }
}
