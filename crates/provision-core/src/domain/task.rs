//! Declarative task model.
//!
//! A task names a desired piece of ledger state (a guard) and the single
//! write that establishes it (an action). Arguments are `Operand`s: literals
//! or references resolved against the ledger and the configured accounts at
//! evaluation time.

use serde::{Deserialize, Serialize};

use super::ids::{Role, TaskId};
use super::primitives::{Address, Bytes32};
use super::value::Selector;

/// One provisioning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDecl {
    pub id: TaskId,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Account the action is signed by.
    #[serde(default)]
    pub from: Role,
    pub guard: Guard,
    pub action: ActionTemplate,
}

impl TaskDecl {
    pub fn new(
        id: impl Into<TaskId>,
        description: impl Into<String>,
        guard: Guard,
        action: ActionTemplate,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            depends_on: Vec::new(),
            tags: Vec::new(),
            from: Role::default(),
            guard,
            action,
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.depends_on.extend(deps.iter().map(|d| TaskId::from(*d)));
        self
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn signed_by(mut self, role: Role) -> Self {
        self.from = role;
        self
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }

    /// Every account role this task touches: its signer plus any role
    /// referenced from the guard or the action.
    pub fn roles(&self) -> Vec<Role> {
        let mut roles = vec![self.from.clone()];
        self.guard.satisfied.collect_roles(&mut roles);
        if let Some(cond) = &self.guard.applies_when {
            cond.collect_roles(&mut roles);
        }
        for op in self.action.operands() {
            op.collect_roles(&mut roles);
        }
        roles.sort();
        roles.dedup();
        roles
    }
}

/// Idempotency guard of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guard {
    /// When true on the ledger the task is already done.
    pub satisfied: Condition,
    /// When present and false the task does not apply to the current
    /// ledger state and is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applies_when: Option<Condition>,
}

impl Guard {
    pub fn satisfied_when(condition: Condition) -> Self {
        Self {
            satisfied: condition,
            applies_when: None,
        }
    }

    pub fn applies_when(mut self, condition: Condition) -> Self {
        self.applies_when = Some(condition);
        self
    }
}

/// Predicate over ledger state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// A deployment exists under `name`; when `args` is given the recorded
    /// constructor arguments must match as well.
    Deployed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Vec<Operand>>,
    },
    /// A read query returns `expected`.
    Equals { call: ReadCall, expected: Operand },
    /// Both operands resolve to equal values.
    Same(Operand, Operand),
    Not(Box<Condition>),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn deployed(name: &str) -> Self {
        Condition::Deployed {
            name: name.to_string(),
            args: None,
        }
    }

    pub fn deployed_with(name: &str, args: Vec<Operand>) -> Self {
        Condition::Deployed {
            name: name.to_string(),
            args: Some(args),
        }
    }

    pub fn equals(call: ReadCall, expected: Operand) -> Self {
        Condition::Equals { call, expected }
    }

    pub fn same(left: Operand, right: Operand) -> Self {
        Condition::Same(left, right)
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    fn collect_roles(&self, out: &mut Vec<Role>) {
        match self {
            Condition::Deployed { args, .. } => {
                for op in args.iter().flatten() {
                    op.collect_roles(out);
                }
            }
            Condition::Equals { call, expected } => {
                call.target.collect_roles(out);
                for op in &call.args {
                    op.collect_roles(out);
                }
                expected.collect_roles(out);
            }
            Condition::Same(left, right) => {
                left.collect_roles(out);
                right.collect_roles(out);
            }
            Condition::Not(inner) => inner.collect_roles(out),
            Condition::All(items) | Condition::Any(items) => {
                for c in items {
                    c.collect_roles(out);
                }
            }
        }
    }
}

/// A read against a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadCall {
    pub target: Operand,
    pub query: Selector,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Operand>,
}

impl ReadCall {
    pub fn new(target: Operand, query: &str, args: Vec<Operand>) -> Self {
        Self {
            target,
            query: Selector::new(query),
            args,
        }
    }
}

/// Argument that is resolved to a `Value` when the task is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// The zero address.
    Zero,
    Bool(bool),
    Uint(u64),
    Text(String),
    Address(Address),
    Bytes32(Bytes32),
    /// Address of the named deployment.
    Deployment(String),
    /// Address of a configured account.
    Account(Role),
    /// Name hash of a dotted name.
    Node(String),
    /// Hash of a single label.
    Label(String),
    /// ERC-165 id of the interface made of these function signatures.
    Interface(Vec<String>),
}

impl Operand {
    pub fn deployment(name: &str) -> Self {
        Operand::Deployment(name.to_string())
    }

    pub fn node(name: &str) -> Self {
        Operand::Node(name.to_string())
    }

    pub fn label(label: &str) -> Self {
        Operand::Label(label.to_string())
    }

    fn collect_roles(&self, out: &mut Vec<Role>) {
        if let Operand::Account(role) = self {
            out.push(role.clone());
        }
    }
}

/// The single write that establishes a task's desired state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTemplate {
    /// Deploy `contract`; the deployment is recorded under the same name.
    Deploy {
        contract: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Operand>,
    },
    /// Invoke `selector` on `target`.
    Call {
        target: Operand,
        selector: Selector,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Operand>,
    },
}

impl ActionTemplate {
    pub fn deploy(contract: &str, args: Vec<Operand>) -> Self {
        ActionTemplate::Deploy {
            contract: contract.to_string(),
            args,
        }
    }

    pub fn call(target: Operand, selector: &str, args: Vec<Operand>) -> Self {
        ActionTemplate::Call {
            target,
            selector: Selector::new(selector),
            args,
        }
    }

    fn operands(&self) -> impl Iterator<Item = &Operand> {
        let (target, args) = match self {
            ActionTemplate::Deploy { args, .. } => (None, args),
            ActionTemplate::Call { target, args, .. } => (Some(target), args),
        };
        target.into_iter().chain(args.iter())
    }
}

/// An ordered collection of task declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub tasks: Vec<TaskDecl>,
}

impl Manifest {
    pub fn new(tasks: Vec<TaskDecl>) -> Self {
        Self { tasks }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
