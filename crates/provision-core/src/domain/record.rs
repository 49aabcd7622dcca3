//! Records produced while executing a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{SubmissionId, TaskId};
use super::primitives::Address;
use super::state::{TaskStatus, TxStatus};

/// A write the ledger has accepted, as seen by the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub submission_id: SubmissionId,
    pub task_id: TaskId,
    pub from: Address,
    pub nonce: u64,
    pub status: TxStatus,
}

/// Per-task outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub task_id: TaskId,
    pub description: String,
    #[serde(flatten)]
    pub status: TaskStatus,
    /// `None` when the task was never attempted.
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn was_attempted(&self) -> bool {
        self.started_at.is_some()
    }
}
