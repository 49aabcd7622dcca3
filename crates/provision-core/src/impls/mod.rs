//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryLedger**: JSON スナップショット付きの ledger シミュレーション
//! - **LocalSigner**: プロセス内に鍵を持つ signer
//! - **TracingEventSink** / **RecordingEventSink**: イベント配送

pub mod event_sinks;
pub mod local_signer;
pub mod memory_ledger;

pub use self::event_sinks::{RecordingEventSink, TracingEventSink};
pub use self::local_signer::{KeyError, LocalSigner};
pub use self::memory_ledger::{InMemoryLedger, LedgerSnapshot, LedgerStats, SnapshotError};
