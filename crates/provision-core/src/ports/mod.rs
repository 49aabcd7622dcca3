//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部の関心事（ledger, 鍵, 時刻, ID 生成, イベント配送）を 1 つずつ隠蔽し、
//! テストではアプリケーション層を in-memory 実装で動かせるようにします。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod ledger;
pub mod signer;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger::{Deployment, LedgerClient, LedgerError};
pub use self::signer::{Accounts, Signer, SignerError};
