//! Events - run のライフサイクルイベント
//!
//! タスクの状態が進むたびに `EventSink` へ送られます。

use serde::{Deserialize, Serialize};

use super::ids::{RunId, SubmissionId, TaskId};
use super::state::{FailureReason, SkipReason};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted { run_id: RunId, tasks: usize },
    TaskEvaluating { task_id: TaskId },
    TaskSkipped { task_id: TaskId, reason: SkipReason },
    TaskSubmitting { task_id: TaskId, request: String },
    TaskApplied { task_id: TaskId, tx: SubmissionId },
    TaskFailed { task_id: TaskId, reason: FailureReason },
    RunFinished { run_id: RunId, success: bool },
}

impl RunEvent {
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            RunEvent::TaskEvaluating { task_id }
            | RunEvent::TaskSkipped { task_id, .. }
            | RunEvent::TaskSubmitting { task_id, .. }
            | RunEvent::TaskApplied { task_id, .. }
            | RunEvent::TaskFailed { task_id, .. } => Some(task_id),
            RunEvent::RunStarted { .. } | RunEvent::RunFinished { .. } => None,
        }
    }
}
