//! LedgerClient port - orchestrator が ledger に触れる唯一の経路
//!
//! # 設計原則
//! - read は副作用なし（何度呼んでも同じ結果）
//! - write は ledger が受理した時点で返る（重複排除はしない）
//! - 確定は `status` で別途観測する

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Address, PendingTransaction, ReadRequest, SubmissionId, TxStatus, Value, WriteRequest,
};
use crate::ports::Signer;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Transport-level failure; the same request may succeed later.
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    /// The ledger refused the request.
    #[error("reverted: {0}")]
    Reverted(String),

    /// The signer has no authority for the write.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unknown submission: {0}")]
    UnknownSubmission(SubmissionId),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unreachable(_))
    }
}

/// A named deployment as recorded in the ledger's deployment book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub address: Address,
    pub args: Vec<Value>,
    pub deployer: Address,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn read(&self, request: &ReadRequest) -> Result<Value, LedgerError>;

    /// Submit a write signed by `signer`.
    async fn write(
        &self,
        request: &WriteRequest,
        signer: &dyn Signer,
    ) -> Result<PendingTransaction, LedgerError>;

    async fn status(&self, submission: &SubmissionId) -> Result<TxStatus, LedgerError>;

    /// Look up a deployment by name.
    async fn deployment(&self, name: &str) -> Result<Option<Deployment>, LedgerError>;
}
