//! Domain identifiers (strongly-typed IDs).
//!
//! # 2 種類の ID
//! - 生成 ID（`SubmissionId`, `RunId`）: ULID ベースの `Id<T>`。時刻でソート可能
//! - 宣言名（`TaskId`, `Role`）: マニフェスト作成者が付ける文字列の newtype
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を提供しつつ、`T` は実行時には使わないマーカー型として
//! コンパイル時の型安全性を提供します（SubmissionId と RunId は混同できない）。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display prefix, e.g. `"tx-"`.
    fn prefix() -> &'static str;
}

/// ULID-backed identifier; `T` only exists at compile time.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Submission {}

impl IdMarker for Submission {
    fn prefix() -> &'static str {
        "tx-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identifier the ledger hands back for a submitted write.
pub type SubmissionId = Id<Submission>;

/// Identifier of one orchestrator run.
pub type RunId = Id<Run>;

macro_rules! name_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

name_newtype!(
    /// Unique name of a provisioning task, e.g. `registrar.deploy`.
    TaskId
);

name_newtype!(
    /// Named account role (`deployer`, `owner`, ...) resolved through config.
    Role
);

impl Role {
    pub fn deployer() -> Self {
        Self::new("deployer")
    }

    pub fn owner() -> Self {
        Self::new("owner")
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::deployer()
    }
}
