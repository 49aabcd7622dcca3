//! Orchestrator - 解決済みグラフを最後まで実行
//!
//! # 状態遷移
//! `Pending -> Evaluating -> {Skipped | Submitting -> {Applied | Failed}}`
//! - 依存がすべて `Skipped` か `Applied` になってから評価を開始
//! - 依存が失敗したタスクは読み書きせずに `Failed(DependencyFailed)`
//!
//! # 並行実行
//! タスクは解決済みの順序で開始します。`parallelism == 1` なら単一ストリーム、
//! それ以上なら依存が確定したタスクを上限まで同時に実行します。
//! 同じ signer の書き込みは submitter 側で直列化されます。
//!
//! # キャンセル
//! タスクの合間にチェックします。新規タスクは開始せず、実行中のタスクは完了を待ち、
//! 未開始のタスクは `Failed(Cancelled)` になります。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::app::guard::{IdempotencyGuard, Verdict};
use crate::app::report::{Plan, PlanEntry, PlannedStep, RunReport};
use crate::app::resolver::ResolvedGraph;
use crate::app::submitter::{TransactionSubmitter, TxOutcome};
use crate::domain::{
    ExecutionRecord, FailureReason, IllegalTransition, RunEvent, SkipReason, TaskDecl, TaskId,
    TaskState, TaskStatus, WriteRequest,
};
use crate::ports::{Accounts, Clock, EventSink, IdGenerator};

/// 実行中の Orchestrator に新規タスクの開始を止めさせるハンドル
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// 1 回の run における全タスクの状態（遷移は `TaskState::advance` で検証）
#[derive(Clone)]
struct Lifecycle {
    inner: Arc<Mutex<LifecycleState>>,
}

struct LifecycleState {
    states: Vec<TaskState>,
    violations: Vec<IllegalTransition>,
}

impl Lifecycle {
    fn new(tasks: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LifecycleState {
                states: vec![TaskState::Pending; tasks],
                violations: Vec::new(),
            })),
        }
    }

    fn advance(&self, index: usize, task: &TaskId, next: TaskState) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(violation) = inner.states[index].advance(next) {
            error!(task = %task, error = %violation, "task lifecycle violated");
            inner.violations.push(violation);
        }
    }

    #[cfg(test)]
    fn states(&self) -> Vec<TaskState> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .states
            .clone()
    }

    #[cfg(test)]
    fn violations(&self) -> Vec<IllegalTransition> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .violations
            .clone()
    }
}

/// 1 タスクの評価と適用。spawn ごとに clone される
#[derive(Clone)]
struct TaskExecutor {
    guard: Arc<IdempotencyGuard>,
    submitter: Arc<TransactionSubmitter>,
    accounts: Accounts,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl TaskExecutor {
    async fn execute(self, index: usize, task: TaskDecl, lifecycle: Lifecycle) -> ExecutionRecord {
        let started_at = self.clock.now();
        lifecycle.advance(index, &task.id, TaskState::Evaluating);
        self.events.emit(RunEvent::TaskEvaluating {
            task_id: task.id.clone(),
        });

        let status = match self.guard.evaluate(&task).await {
            Ok(Verdict::Satisfied) => TaskStatus::Skipped {
                reason: SkipReason::AlreadySatisfied,
            },
            Ok(Verdict::NotApplicable) => TaskStatus::Skipped {
                reason: SkipReason::NotApplicable,
            },
            Ok(Verdict::NeedsAction(request)) => {
                self.apply(&task, request, |next| lifecycle.advance(index, &task.id, next))
                    .await
            }
            Err(err) => {
                warn!(task = %task.id, error = %err, "evaluation failed");
                TaskStatus::Failed {
                    reason: err.into_failure(),
                }
            }
        };

        lifecycle.advance(index, &task.id, status.state());
        self.emit_terminal(&task.id, &status);
        ExecutionRecord {
            task_id: task.id,
            description: task.description,
            status,
            started_at: Some(started_at),
            finished_at: self.clock.now(),
        }
    }

    async fn apply(
        &self,
        task: &TaskDecl,
        request: WriteRequest,
        advance: impl Fn(TaskState),
    ) -> TaskStatus {
        let Some(signer) = self.accounts.signer(&task.from) else {
            return TaskStatus::Failed {
                reason: FailureReason::Unauthorized {
                    message: format!("no signer configured for account {}", task.from),
                },
            };
        };
        advance(TaskState::Submitting);
        self.events.emit(RunEvent::TaskSubmitting {
            task_id: task.id.clone(),
            request: request.to_string(),
        });
        match self.submitter.submit(&request, signer.as_ref()).await {
            TxOutcome::Confirmed(tx) => TaskStatus::Applied { tx },
            TxOutcome::Failed(reason) => TaskStatus::Failed { reason },
        }
    }

    fn emit_terminal(&self, task_id: &TaskId, status: &TaskStatus) {
        let task_id = task_id.clone();
        let event = match status {
            TaskStatus::Skipped { reason } => RunEvent::TaskSkipped {
                task_id,
                reason: *reason,
            },
            TaskStatus::Applied { tx } => RunEvent::TaskApplied { task_id, tx: *tx },
            TaskStatus::Failed { reason } => RunEvent::TaskFailed {
                task_id,
                reason: reason.clone(),
            },
        };
        self.events.emit(event);
    }
}

enum Readiness {
    /// Some dependency has not finished yet.
    Waiting,
    /// Every dependency ended `Skipped` or `Applied`.
    Ready,
    /// This dependency failed.
    Blocked(TaskId),
}

pub struct Orchestrator {
    executor: TaskExecutor,
    ids: Arc<dyn IdGenerator>,
    parallelism: usize,
    cancel: Arc<watch::Sender<bool>>,
}

impl Orchestrator {
    pub(crate) fn new(
        guard: Arc<IdempotencyGuard>,
        submitter: Arc<TransactionSubmitter>,
        accounts: Accounts,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        parallelism: usize,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            executor: TaskExecutor {
                guard,
                submitter,
                accounts,
                events,
                clock,
            },
            ids,
            parallelism: parallelism.max(1),
            cancel: Arc::new(cancel),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel.clone(),
        }
    }

    /// `graph` の全タスクを実行し、結果を報告
    pub async fn run(&self, graph: &ResolvedGraph) -> RunReport {
        self.run_tracked(graph, &Lifecycle::new(graph.len())).await
    }

    async fn run_tracked(&self, graph: &ResolvedGraph, lifecycle: &Lifecycle) -> RunReport {
        let run_id = self.ids.generate_run_id();
        let started_at = self.executor.clock.now();
        let tasks = graph.tasks();
        info!(run = %run_id, tasks = tasks.len(), parallelism = self.parallelism, "run started");
        self.executor.events.emit(RunEvent::RunStarted {
            run_id,
            tasks: tasks.len(),
        });

        let position: HashMap<&TaskId, usize> =
            tasks.iter().enumerate().map(|(i, t)| (&t.id, i)).collect();
        let mut records: Vec<Option<ExecutionRecord>> = vec![None; tasks.len()];
        let mut started = vec![false; tasks.len()];
        let mut running: JoinSet<(usize, ExecutionRecord)> = JoinSet::new();
        let cancel = self.cancel.subscribe();
        let mut cancelled = false;
        // Set when a spawned task panicked; its slot can no longer be told apart.
        let mut halted = false;

        loop {
            if !cancelled && *cancel.borrow() {
                cancelled = true;
                info!(run = %run_id, "cancellation requested; no further tasks start");
            }
            if !cancelled && !halted {
                for (i, task) in tasks.iter().enumerate() {
                    if running.len() >= self.parallelism {
                        break;
                    }
                    if started[i] {
                        continue;
                    }
                    match readiness(graph, task, &records, &position) {
                        Readiness::Waiting => {}
                        Readiness::Blocked(dep) => {
                            started[i] = true;
                            records[i] = Some(self.unattempted(
                                i,
                                task,
                                lifecycle,
                                FailureReason::DependencyFailed { task: dep },
                            ));
                        }
                        Readiness::Ready => {
                            started[i] = true;
                            let executor = self.executor.clone();
                            let task = task.clone();
                            let lifecycle = lifecycle.clone();
                            running.spawn(async move {
                                (i, executor.execute(i, task, lifecycle).await)
                            });
                        }
                    }
                }
            }

            match running.join_next().await {
                Some(Ok((i, record))) => {
                    debug!(task = %record.task_id, status = %record.status, "task finished");
                    records[i] = Some(record);
                }
                Some(Err(err)) => {
                    warn!(run = %run_id, error = %err, "task aborted; no further tasks start");
                    halted = true;
                }
                None => {
                    if cancelled || halted || started.iter().all(|s| *s) {
                        break;
                    }
                }
            }
        }

        let records: Vec<ExecutionRecord> = tasks
            .iter()
            .zip(records)
            .zip(started)
            .enumerate()
            .map(|(i, ((task, record), started))| match record {
                Some(record) => record,
                None if started => self.unattempted(
                    i,
                    task,
                    lifecycle,
                    FailureReason::Infrastructure {
                        message: "task aborted before recording an outcome".into(),
                    },
                ),
                None => self.unattempted(i, task, lifecycle, FailureReason::Cancelled),
            })
            .collect();

        let report = RunReport::new(
            run_id,
            started_at,
            self.executor.clock.now(),
            records,
            cancelled,
        );
        info!(
            run = %run_id,
            applied = report.counts.applied,
            skipped = report.counts.skipped,
            failed = report.counts.failed,
            "run finished"
        );
        self.executor.events.emit(RunEvent::RunFinished {
            run_id,
            success: report.is_success(),
        });
        report
    }

    /// 書き込みなしで guard だけを評価（dry run）
    ///
    /// 依存がすべて ledger 上で確定しているタスクだけを評価し、
    /// それ以外は未確定の依存に対する `Blocked` として報告します。
    pub async fn plan(&self, graph: &ResolvedGraph) -> Plan {
        let mut entries: Vec<PlanEntry> = Vec::with_capacity(graph.len());
        let mut settled: HashMap<TaskId, bool> = HashMap::new();

        for task in graph.tasks() {
            let unsettled: Vec<TaskId> = graph
                .dependencies_of(&task.id)
                .into_iter()
                .filter(|dep| !settled.get(dep).copied().unwrap_or(false))
                .collect();
            let step = if !unsettled.is_empty() {
                PlannedStep::Blocked { on: unsettled }
            } else {
                match self.executor.guard.evaluate(task).await {
                    Ok(Verdict::Satisfied) => PlannedStep::Satisfied,
                    Ok(Verdict::NotApplicable) => PlannedStep::NotApplicable,
                    Ok(Verdict::NeedsAction(request)) => PlannedStep::Submit {
                        request: request.to_string(),
                    },
                    Err(err) => PlannedStep::Error {
                        reason: err.into_failure(),
                    },
                }
            };
            settled.insert(task.id.clone(), step.is_settled());
            entries.push(PlanEntry {
                task_id: task.id.clone(),
                description: task.description.clone(),
                step,
            });
        }
        Plan { entries }
    }

    fn unattempted(
        &self,
        index: usize,
        task: &TaskDecl,
        lifecycle: &Lifecycle,
        reason: FailureReason,
    ) -> ExecutionRecord {
        lifecycle.advance(index, &task.id, TaskState::Failed);
        let status = TaskStatus::Failed { reason };
        self.executor.emit_terminal(&task.id, &status);
        ExecutionRecord {
            task_id: task.id.clone(),
            description: task.description.clone(),
            status,
            started_at: None,
            finished_at: self.executor.clock.now(),
        }
    }
}

fn readiness(
    graph: &ResolvedGraph,
    task: &TaskDecl,
    records: &[Option<ExecutionRecord>],
    position: &HashMap<&TaskId, usize>,
) -> Readiness {
    let mut waiting = false;
    for dep in graph.dependencies_of(&task.id) {
        match position.get(&dep).and_then(|i| records[*i].as_ref()) {
            Some(record) if record.status.is_failed() => return Readiness::Blocked(dep),
            Some(_) => {}
            None => waiting = true,
        }
    }
    if waiting {
        Readiness::Waiting
    } else {
        Readiness::Ready
    }
}
