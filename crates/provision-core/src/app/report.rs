//! Run report and dry-run plan.

use std::fmt::{self, Write as _};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ExecutionRecord, FailureReason, RunId, TaskId, TaskStatus};
use crate::observability::RunCounts;

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One record per task, in resolved order.
    pub records: Vec<ExecutionRecord>,
    /// Earliest failure that was not caused by another task.
    pub first_failure: Option<TaskId>,
    /// Tasks that never reached evaluation, in resolved order.
    pub never_attempted: Vec<TaskId>,
    pub cancelled: bool,
    pub counts: RunCounts,
}

impl RunReport {
    pub fn new(
        run_id: RunId,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        records: Vec<ExecutionRecord>,
        cancelled: bool,
    ) -> Self {
        let first_failure = records
            .iter()
            .filter(|r| r.status.failure().is_some_and(FailureReason::is_root_cause))
            .min_by_key(|r| r.finished_at)
            .map(|r| r.task_id.clone());
        let never_attempted = records
            .iter()
            .filter(|r| !r.was_attempted())
            .map(|r| r.task_id.clone())
            .collect();
        let counts = RunCounts::from_records(&records);
        Self {
            run_id,
            started_at,
            finished_at,
            records,
            first_failure,
            never_attempted,
            cancelled,
            counts,
        }
    }

    /// Every task ended `Skipped` or `Applied`.
    pub fn is_success(&self) -> bool {
        self.records.iter().all(|r| !r.status.is_failed())
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Writes confirmed during the run.
    pub fn writes(&self) -> usize {
        self.counts.applied
    }

    pub fn record(&self, task: &str) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| r.task_id.as_str() == task)
    }

    pub fn status_of(&self, task: &str) -> Option<&TaskStatus> {
        self.record(task).map(|r| &r.status)
    }

    pub fn first_failure_reason(&self) -> Option<&FailureReason> {
        let task = self.first_failure.as_ref()?;
        self.record(task.as_str())?.status.failure()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = id_width(self.records.iter().map(|r| &r.task_id));
        for record in &self.records {
            writeln!(f, "  {:<width$}  {}", record.task_id.as_str(), record.status)?;
        }
        writeln!(
            f,
            "{}: {} applied, {} skipped, {} failed",
            self.run_id, self.counts.applied, self.counts.skipped, self.counts.failed
        )?;
        if self.cancelled {
            writeln!(f, "run was cancelled")?;
        }
        if let (Some(task), Some(reason)) = (&self.first_failure, self.first_failure_reason()) {
            writeln!(f, "first failure: {task}: {reason}")?;
        }
        if !self.never_attempted.is_empty() {
            writeln!(f, "never attempted: {}", join_ids(&self.never_attempted))?;
        }
        Ok(())
    }
}

/// What a dry run found for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlannedStep {
    Satisfied,
    NotApplicable,
    /// The guard rendered this write.
    Submit { request: String },
    /// A dependency would change state first, so the guard was not evaluated.
    Blocked { on: Vec<TaskId> },
    Error { reason: FailureReason },
}

impl PlannedStep {
    /// Whether the task's outcome leaves dependents free to be evaluated.
    pub fn is_settled(&self) -> bool {
        matches!(self, PlannedStep::Satisfied | PlannedStep::NotApplicable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub task_id: TaskId,
    pub description: String,
    #[serde(flatten)]
    pub step: PlannedStep,
}

/// Dry-run result: the guards' view of every task, in resolved order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn entry(&self, task: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.task_id.as_str() == task)
    }

    /// Tasks whose guard rendered a write.
    pub fn pending_writes(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.step, PlannedStep::Submit { .. }))
            .count()
    }

    /// Nothing would be written.
    pub fn is_noop(&self) -> bool {
        self.entries.iter().all(|e| e.step.is_settled())
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.step, PlannedStep::Error { .. }))
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = id_width(self.entries.iter().map(|e| &e.task_id));
        for entry in &self.entries {
            let step = match &entry.step {
                PlannedStep::Satisfied => "ok".to_string(),
                PlannedStep::NotApplicable => "not applicable".to_string(),
                PlannedStep::Submit { request } => format!("would submit {request}"),
                PlannedStep::Blocked { on } => format!("after {}", join_ids(on)),
                PlannedStep::Error { reason } => format!("error: {reason}"),
            };
            writeln!(f, "  {:<width$}  {step}", entry.task_id.as_str())?;
        }
        writeln!(
            f,
            "{} of {} tasks would submit",
            self.pending_writes(),
            self.entries.len()
        )
    }
}

fn id_width<'a>(ids: impl Iterator<Item = &'a TaskId>) -> usize {
    ids.map(|id| id.as_str().len()).max().unwrap_or(0)
}

fn join_ids(ids: &[TaskId]) -> String {
    let mut out = String::new();
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{id}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SkipReason;
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn record(id: &str, status: TaskStatus, started: Option<i64>, finished: i64) -> ExecutionRecord {
        ExecutionRecord {
            task_id: TaskId::from(id),
            description: String::new(),
            status,
            started_at: started.map(at),
            finished_at: at(finished),
        }
    }

    fn failed(reason: FailureReason) -> TaskStatus {
        TaskStatus::Failed { reason }
    }

    fn rejected() -> FailureReason {
        FailureReason::Rejected {
            message: "reverted".into(),
        }
    }

    fn report(records: Vec<ExecutionRecord>) -> RunReport {
        RunReport::new(RunId::from(Ulid::nil()), at(0), at(10), records, false)
    }

    #[test]
    fn successful_run_exits_zero() {
        let report = report(vec![record(
            "a",
            TaskStatus::Skipped {
                reason: SkipReason::AlreadySatisfied,
            },
            Some(0),
            1,
        )]);
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.writes(), 0);
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn first_failure_ignores_propagated_failures() {
        let report = report(vec![
            record(
                "c",
                failed(FailureReason::DependencyFailed {
                    task: TaskId::from("b"),
                }),
                None,
                1,
            ),
            record("b", failed(rejected()), Some(1), 2),
            record("d", failed(rejected()), Some(3), 4),
        ]);

        assert_eq!(report.first_failure, Some(TaskId::from("b")));
        assert_eq!(report.first_failure_reason(), Some(&rejected()));
        assert_eq!(report.never_attempted, vec![TaskId::from("c")]);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn text_report_names_failure_and_unattempted_tasks() {
        let report = report(vec![
            record("b", failed(rejected()), Some(1), 2),
            record(
                "c",
                failed(FailureReason::DependencyFailed {
                    task: TaskId::from("b"),
                }),
                None,
                2,
            ),
        ]);
        let text = report.to_string();
        assert!(text.contains("first failure: b: rejected: reverted"));
        assert!(text.contains("never attempted: c"));
        assert!(text.contains("0 applied, 0 skipped, 2 failed"));
    }

    #[test]
    fn report_serializes_status_inline() {
        let report = report(vec![record(
            "a",
            TaskStatus::Skipped {
                reason: SkipReason::NotApplicable,
            },
            Some(0),
            1,
        )]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["records"][0]["status"], "skipped");
        assert_eq!(json["records"][0]["reason"], "not_applicable");
    }

    #[test]
    fn plan_counts_pending_writes() {
        let plan = Plan {
            entries: vec![
                PlanEntry {
                    task_id: TaskId::from("a"),
                    description: String::new(),
                    step: PlannedStep::Submit {
                        request: "deploy A()".into(),
                    },
                },
                PlanEntry {
                    task_id: TaskId::from("b"),
                    description: String::new(),
                    step: PlannedStep::Blocked {
                        on: vec![TaskId::from("a")],
                    },
                },
                PlanEntry {
                    task_id: TaskId::from("c"),
                    description: String::new(),
                    step: PlannedStep::Satisfied,
                },
            ],
        };
        assert_eq!(plan.pending_writes(), 1);
        assert!(!plan.is_noop());
        assert!(plan.to_string().contains("b  after a"));
    }
}
