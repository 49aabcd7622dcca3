//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてプロビジョニングの流れを実装します。
//!
//! # 主要コンポーネント
//! - **resolver**: 宣言の検証と実行順序の確定
//! - **guard**: ledger の読み取りから、タスクにまだ作業が残っているかを判定
//! - **submitter**: 1 回の呼び出しで 1 書き込み、終端ステータスまで待機
//! - **orchestrator**: タスクごとの状態機械、fail-fast 伝播、plan
//! - **builder**: ワイヤリングと起動時検証

pub mod builder;
pub mod dependency;
pub mod guard;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod submitter;

pub use self::builder::{BuildError, OrchestratorBuilder};
pub use self::dependency::DependencyGraph;
pub use self::guard::{GuardError, IdempotencyGuard, Verdict};
pub use self::orchestrator::{CancelHandle, Orchestrator};
pub use self::report::{Plan, PlanEntry, PlannedStep, RunReport};
pub use self::resolver::{GraphError, ResolvedGraph, resolve};
pub use self::retry::RetryPolicy;
pub use self::submitter::{SubmitterConfig, TransactionSubmitter, TxOutcome};
