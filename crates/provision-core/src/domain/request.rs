//! Concrete ledger requests, produced from task templates once every
//! operand has been resolved.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::primitives::Address;
use super::value::{Selector, Value, join_values};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub target: Address,
    pub query: Selector,
    pub args: Vec<Value>,
}

impl ReadRequest {
    pub fn new(target: Address, query: impl Into<Selector>, args: Vec<Value>) -> Self {
        Self {
            target,
            query: query.into(),
            args,
        }
    }
}

impl fmt::Display for ReadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.target, self.query, join_values(&self.args))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteKind {
    Deploy { contract: String },
    Call { target: Address, selector: Selector },
}

/// A state-changing request on behalf of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub task_id: TaskId,
    #[serde(flatten)]
    pub kind: WriteKind,
    pub args: Vec<Value>,
}

impl WriteRequest {
    pub fn deploy(task_id: TaskId, contract: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            task_id,
            kind: WriteKind::Deploy {
                contract: contract.into(),
            },
            args,
        }
    }

    pub fn call(
        task_id: TaskId,
        target: Address,
        selector: impl Into<Selector>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            task_id,
            kind: WriteKind::Call {
                target,
                selector: selector.into(),
            },
            args,
        }
    }

    /// Bytes handed to the signer: the rendered request plus the account
    /// nonce it is bound to.
    pub fn signing_payload(&self, nonce: u64) -> Vec<u8> {
        format!("{self}#{nonce}").into_bytes()
    }
}

impl fmt::Display for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WriteKind::Deploy { contract } => {
                write!(f, "deploy {contract}({})", join_values(&self.args))
            }
            WriteKind::Call { target, selector } => {
                write!(f, "{target}.{selector}({})", join_values(&self.args))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_requests_render_readably() {
        let deploy = WriteRequest::deploy(TaskId::from("a"), "Registry", vec![Value::Uint(1)]);
        assert_eq!(deploy.to_string(), "deploy Registry(1)");

        let call = WriteRequest::call(
            TaskId::from("b"),
            Address::ZERO,
            "addController",
            vec![Value::Bool(true)],
        );
        assert_eq!(
            call.to_string(),
            "0x0000000000000000000000000000000000000000.addController(true)"
        );
    }

    #[test]
    fn signing_payload_binds_the_nonce() {
        let req = WriteRequest::deploy(TaskId::from("a"), "Registry", vec![]);
        assert_ne!(req.signing_payload(0), req.signing_payload(1));
    }
}
