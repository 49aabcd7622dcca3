use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionRecord, FailureReason, TaskStatus};

/// Tally of task outcomes for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub skipped: usize,
    pub applied: usize,
    pub failed: usize,
    /// Subset of `failed`: tasks that never reached evaluation.
    pub never_attempted: usize,
    pub cancelled: usize,
}

impl RunCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ExecutionRecord>) -> Self {
        let mut counts = Self::default();
        for record in records {
            match &record.status {
                TaskStatus::Skipped { .. } => counts.skipped += 1,
                TaskStatus::Applied { .. } => counts.applied += 1,
                TaskStatus::Failed { reason } => {
                    counts.failed += 1;
                    if matches!(reason, FailureReason::Cancelled) {
                        counts.cancelled += 1;
                    }
                }
            }
            if !record.was_attempted() {
                counts.never_attempted += 1;
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.skipped + self.applied + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SkipReason, TaskId};
    use chrono::Utc;

    fn record(id: &str, status: TaskStatus, attempted: bool) -> ExecutionRecord {
        let now = Utc::now();
        ExecutionRecord {
            task_id: TaskId::from(id),
            description: String::new(),
            status,
            started_at: attempted.then_some(now),
            finished_at: now,
        }
    }

    #[test]
    fn counts_each_outcome() {
        let records = vec![
            record(
                "a",
                TaskStatus::Skipped {
                    reason: SkipReason::AlreadySatisfied,
                },
                true,
            ),
            record(
                "b",
                TaskStatus::Failed {
                    reason: FailureReason::Rejected {
                        message: "no".into(),
                    },
                },
                true,
            ),
            record(
                "c",
                TaskStatus::Failed {
                    reason: FailureReason::DependencyFailed {
                        task: TaskId::from("b"),
                    },
                },
                false,
            ),
            record(
                "d",
                TaskStatus::Failed {
                    reason: FailureReason::Cancelled,
                },
                false,
            ),
        ];

        let counts = RunCounts::from_records(&records);
        assert_eq!(
            counts,
            RunCounts {
                skipped: 1,
                applied: 0,
                failed: 3,
                never_attempted: 2,
                cancelled: 1,
            }
        );
        assert_eq!(counts.total(), 4);
    }
}
