//! Domain model (primitives, ids, task declarations, states, records, events).

pub mod events;
pub mod ids;
pub mod primitives;
pub mod record;
pub mod request;
pub mod state;
pub mod task;
pub mod value;

pub use events::RunEvent;
pub use ids::{Id, IdMarker, Role, RunId, SubmissionId, TaskId};
pub use primitives::{
    Address, Bytes32, InterfaceId, NameNode, ParseError, keccak256, labelhash, namehash,
    selector, subnode,
};
pub use record::{ExecutionRecord, PendingTransaction};
pub use request::{ReadRequest, WriteKind, WriteRequest};
pub use state::{FailureReason, IllegalTransition, SkipReason, TaskState, TaskStatus, TxStatus};
pub use task::{ActionTemplate, Condition, Guard, Manifest, Operand, ReadCall, TaskDecl};
pub use value::{Selector, Value};
