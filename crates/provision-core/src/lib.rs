//! provision-core
//!
//! Idempotent, dependency-ordered provisioning against a ledger.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（primitives, ids, task, state, record, events）
//! - **ports**: 抽象化レイヤー（LedgerClient, Signer, Clock, IdGenerator, EventSink）
//! - **app**: アプリケーションロジック（resolver, guard, submitter, orchestrator, builder）
//! - **impls**: 実装（InMemoryLedger, LocalSigner など開発用）
//! - **builtin**: 組み込みの `remilias` マニフェスト
//! - **config**: TOML 設定とマニフェストの読み込み

pub mod app;
pub mod builtin;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;

pub use error::ProvisionError;
