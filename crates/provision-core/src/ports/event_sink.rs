//! EventSink port - イベント記録の抽象化
//!
//! # 実装
//! - NoopEventSink（何もしない、デフォルト）
//! - TracingEventSink / RecordingEventSink（impls）

use crate::domain::RunEvent;

/// EventSink は run のライフサイクルイベントを受け取る
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// NoopEventSink は全イベントを捨てる
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: RunEvent) {}
}
