//! EventSink の実装

use std::sync::{Mutex, PoisonError};

use tracing::{info, warn};

use crate::domain::{RunEvent, TaskId};
use crate::ports::EventSink;

/// TracingEventSink は全イベントを `tracing` に書き出す
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: RunEvent) {
        match event {
            RunEvent::RunStarted { run_id, tasks } => info!(%run_id, tasks, "run started"),
            RunEvent::TaskEvaluating { task_id } => info!(task = %task_id, "evaluating"),
            RunEvent::TaskSkipped { task_id, reason } => {
                info!(task = %task_id, ?reason, "skipped")
            }
            RunEvent::TaskSubmitting { task_id, request } => {
                info!(task = %task_id, %request, "submitting")
            }
            RunEvent::TaskApplied { task_id, tx } => info!(task = %task_id, %tx, "applied"),
            RunEvent::TaskFailed { task_id, reason } => {
                warn!(task = %task_id, %reason, "failed")
            }
            RunEvent::RunFinished { run_id, success } => info!(%run_id, success, "run finished"),
        }
    }
}

/// RecordingEventSink は全イベントを発行順にメモリに保持（テスト用）
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Task ids in the order they entered evaluation.
    pub fn evaluation_order(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::TaskEvaluating { task_id } => Some(task_id),
                _ => None,
            })
            .collect()
    }

    /// Position of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&RunEvent) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: RunEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.emit(RunEvent::TaskEvaluating {
            task_id: TaskId::from("a"),
        });
        sink.emit(RunEvent::TaskEvaluating {
            task_id: TaskId::from("b"),
        });

        assert_eq!(
            sink.evaluation_order(),
            vec![TaskId::from("a"), TaskId::from("b")]
        );
    }
}
