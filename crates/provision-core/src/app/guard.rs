//! Idempotency guard: decides, from current ledger state, whether a task
//! still has work to do.
//!
//! Evaluation order:
//! 1. `satisfied` holds -> `Verdict::Satisfied`
//! 2. `applies_when` present and false -> `Verdict::NotApplicable`
//! 3. otherwise the action template is rendered into a `WriteRequest`
//!
//! Only reads are issued. Unreachable reads (including reads that exceed
//! the read timeout) are retried with the configured policy.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::app::retry::RetryPolicy;
use crate::domain::{
    ActionTemplate, Address, Condition, FailureReason, InterfaceId, Operand, ReadCall, ReadRequest,
    Role, TaskDecl, Value, WriteRequest, labelhash, namehash,
};
use crate::ports::{Accounts, Deployment, LedgerClient, LedgerError};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Satisfied,
    NotApplicable,
    NeedsAction(WriteRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("deployment {0} does not exist")]
    MissingDeployment(String),

    #[error("no address configured for account {0}")]
    UnknownAccount(Role),

    #[error("invalid operand: {0}")]
    InvalidOperand(String),
}

impl GuardError {
    pub fn into_failure(self) -> FailureReason {
        match self {
            GuardError::Ledger(LedgerError::Unreachable(message)) => {
                FailureReason::Infrastructure { message }
            }
            GuardError::Ledger(LedgerError::Unauthorized(message)) => {
                FailureReason::Unauthorized { message }
            }
            other => FailureReason::Evaluation {
                message: other.to_string(),
            },
        }
    }
}

pub struct IdempotencyGuard {
    ledger: Arc<dyn LedgerClient>,
    accounts: Accounts,
    retry: RetryPolicy,
    read_timeout: Duration,
}

impl IdempotencyGuard {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        accounts: Accounts,
        retry: RetryPolicy,
        read_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            accounts,
            retry,
            read_timeout,
        }
    }

    pub async fn evaluate(&self, task: &TaskDecl) -> Result<Verdict, GuardError> {
        if self.check(&task.guard.satisfied).await? {
            debug!(task = %task.id, "already satisfied");
            return Ok(Verdict::Satisfied);
        }
        if let Some(precondition) = &task.guard.applies_when {
            if !self.check(precondition).await? {
                debug!(task = %task.id, "precondition does not hold");
                return Ok(Verdict::NotApplicable);
            }
        }
        let request = self.render(task).await?;
        Ok(Verdict::NeedsAction(request))
    }

    /// Turn the task's action template into a concrete request.
    pub async fn render(&self, task: &TaskDecl) -> Result<WriteRequest, GuardError> {
        match &task.action {
            ActionTemplate::Deploy { contract, args } => Ok(WriteRequest::deploy(
                task.id.clone(),
                contract.clone(),
                self.resolve_all(args).await?,
            )),
            ActionTemplate::Call {
                target,
                selector,
                args,
            } => Ok(WriteRequest::call(
                task.id.clone(),
                self.resolve_address(target).await?,
                selector.clone(),
                self.resolve_all(args).await?,
            )),
        }
    }

    fn check<'a>(&'a self, condition: &'a Condition) -> BoxFuture<'a, Result<bool, GuardError>> {
        Box::pin(async move {
            match condition {
                Condition::Deployed { name, args } => {
                    let Some(deployment) = self.lookup(name).await? else {
                        return Ok(false);
                    };
                    match args {
                        None => Ok(true),
                        Some(expected) => Ok(self.resolve_all(expected).await? == deployment.args),
                    }
                }
                Condition::Equals { call, expected } => {
                    let actual = self.read(call).await?;
                    let expected = self.resolve(expected).await?;
                    Ok(actual == expected)
                }
                Condition::Same(left, right) => {
                    Ok(self.resolve(left).await? == self.resolve(right).await?)
                }
                Condition::Not(inner) => Ok(!self.check(inner).await?),
                Condition::All(items) => {
                    for item in items {
                        if !self.check(item).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Condition::Any(items) => {
                    for item in items {
                        if self.check(item).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        })
    }

    async fn read(&self, call: &ReadCall) -> Result<Value, GuardError> {
        let request = ReadRequest::new(
            self.resolve_address(&call.target).await?,
            call.query.clone(),
            self.resolve_all(&call.args).await?,
        );
        let value = self
            .retry
            .run("read", || self.bounded(self.ledger.read(&request)))
            .await?;
        Ok(value)
    }

    async fn lookup(&self, name: &str) -> Result<Option<Deployment>, GuardError> {
        let deployment = self
            .retry
            .run("deployment lookup", || self.bounded(self.ledger.deployment(name)))
            .await?;
        Ok(deployment)
    }

    async fn bounded<T>(
        &self,
        request: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        match tokio::time::timeout(self.read_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Unreachable(format!(
                "no answer within {:?}",
                self.read_timeout
            ))),
        }
    }

    async fn resolve_all(&self, operands: &[Operand]) -> Result<Vec<Value>, GuardError> {
        let mut values = Vec::with_capacity(operands.len());
        for operand in operands {
            values.push(self.resolve(operand).await?);
        }
        Ok(values)
    }

    async fn resolve_address(&self, operand: &Operand) -> Result<Address, GuardError> {
        self.resolve(operand).await?.as_address().ok_or_else(|| {
            GuardError::InvalidOperand(format!("{operand:?} does not name an address"))
        })
    }

    async fn resolve(&self, operand: &Operand) -> Result<Value, GuardError> {
        let value = match operand {
            Operand::Zero => Value::Address(Address::ZERO),
            Operand::Bool(b) => Value::Bool(*b),
            Operand::Uint(n) => Value::Uint(*n),
            Operand::Text(s) => Value::Text(s.clone()),
            Operand::Address(a) => Value::Address(*a),
            Operand::Bytes32(b) => Value::Bytes32(*b),
            Operand::Deployment(name) => match self.lookup(name).await? {
                Some(deployment) => Value::Address(deployment.address),
                None => return Err(GuardError::MissingDeployment(name.clone())),
            },
            Operand::Account(role) => match self.accounts.address(role) {
                Some(address) => Value::Address(address),
                None => return Err(GuardError::UnknownAccount(role.clone())),
            },
            Operand::Node(name) => Value::Bytes32(namehash(name)),
            Operand::Label(label) => Value::Bytes32(labelhash(label)),
            Operand::Interface(signatures) => {
                Value::Bytes4(InterfaceId::from_signatures(signatures))
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Guard, TaskId};
    use crate::impls::{InMemoryLedger, LocalSigner};
    use crate::ports::Signer;

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        deployer: LocalSigner,
        guard: IdempotencyGuard,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new());
        let deployer = LocalSigner::dev(&Role::deployer());
        let accounts = Accounts::new().with_signer(Role::deployer(), Arc::new(deployer.clone()));
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        };
        let guard = IdempotencyGuard::new(
            ledger.clone(),
            accounts,
            policy,
            Duration::from_secs(1),
        );
        Fixture {
            ledger,
            deployer,
            guard,
        }
    }

    fn deploy_task(name: &str, args: Vec<Operand>) -> TaskDecl {
        TaskDecl::new(
            name,
            "",
            Guard::satisfied_when(Condition::deployed_with(name, args.clone())),
            ActionTemplate::deploy(name, args),
        )
    }

    fn external_deploy(f: &Fixture, name: &str, args: Vec<Value>) {
        f.ledger
            .apply_external(&WriteRequest::deploy(TaskId::from(name), name, args), &f.deployer)
            .unwrap();
    }

    #[tokio::test]
    async fn missing_deployment_needs_action() {
        let f = fixture();
        let verdict = f.guard.evaluate(&deploy_task("Widget", vec![])).await.unwrap();

        assert_eq!(
            verdict,
            Verdict::NeedsAction(WriteRequest::deploy(TaskId::from("Widget"), "Widget", vec![]))
        );
        assert_eq!(f.ledger.stats().writes, 0);
    }

    #[tokio::test]
    async fn matching_deployment_is_satisfied() {
        let f = fixture();
        external_deploy(&f, "Widget", vec![Value::Uint(3)]);

        let verdict = f
            .guard
            .evaluate(&deploy_task("Widget", vec![Operand::Uint(3)]))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Satisfied);
    }

    #[tokio::test]
    async fn changed_constructor_args_trigger_redeploy() {
        let f = fixture();
        external_deploy(&f, "Widget", vec![Value::Uint(3)]);

        let verdict = f
            .guard
            .evaluate(&deploy_task("Widget", vec![Operand::Uint(4)]))
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::NeedsAction(_)));
    }

    #[tokio::test]
    async fn false_precondition_is_not_applicable() {
        let f = fixture();
        external_deploy(&f, "Widget", vec![]);
        let task = TaskDecl::new(
            "grant",
            "",
            Guard::satisfied_when(Condition::equals(
                ReadCall::new(
                    Operand::deployment("Widget"),
                    "controllers",
                    vec![Operand::Account(Role::deployer())],
                ),
                Operand::Bool(true),
            ))
            .applies_when(Condition::equals(
                ReadCall::new(Operand::deployment("Widget"), "owner", vec![]),
                Operand::Zero,
            )),
            ActionTemplate::call(
                Operand::deployment("Widget"),
                "addController",
                vec![Operand::Account(Role::deployer())],
            ),
        );

        assert_eq!(f.guard.evaluate(&task).await.unwrap(), Verdict::NotApplicable);
    }

    #[tokio::test]
    async fn call_templates_resolve_every_operand() {
        let f = fixture();
        external_deploy(&f, "Widget", vec![]);
        let widget = f.ledger.deployment("Widget").await.unwrap().unwrap().address;
        let task = TaskDecl::new(
            "iface",
            "",
            Guard::satisfied_when(Condition::equals(
                ReadCall::new(
                    Operand::deployment("Widget"),
                    "addr",
                    vec![Operand::node("remilias.eth")],
                ),
                Operand::Account(Role::deployer()),
            )),
            ActionTemplate::call(
                Operand::deployment("Widget"),
                "setInterface",
                vec![
                    Operand::node("remilias.eth"),
                    Operand::Interface(vec!["supportsInterface(bytes4)".into()]),
                    Operand::Account(Role::deployer()),
                ],
            ),
        );

        let Verdict::NeedsAction(request) = f.guard.evaluate(&task).await.unwrap() else {
            panic!("expected an action");
        };
        assert_eq!(
            request,
            WriteRequest::call(
                TaskId::from("iface"),
                widget,
                "setInterface",
                vec![
                    Value::Bytes32(namehash("remilias.eth")),
                    Value::Bytes4(InterfaceId::from_signatures(&["supportsInterface(bytes4)"])),
                    Value::Address(f.deployer.address()),
                ],
            )
        );
    }

    #[tokio::test]
    async fn same_compares_resolved_operands() {
        let f = fixture();
        external_deploy(&f, "Widget", vec![]);
        let hand_off = |satisfied: Condition| {
            TaskDecl::new(
                "hand-off",
                "",
                Guard::satisfied_when(satisfied),
                ActionTemplate::call(
                    Operand::deployment("Widget"),
                    "transferOwnership",
                    vec![Operand::Account(Role::deployer())],
                ),
            )
        };

        let same_account = hand_off(Condition::same(
            Operand::Account(Role::deployer()),
            Operand::Address(f.deployer.address()),
        ));
        assert_eq!(f.guard.evaluate(&same_account).await.unwrap(), Verdict::Satisfied);

        let different = hand_off(Condition::same(
            Operand::Account(Role::deployer()),
            Operand::deployment("Widget"),
        ));
        assert!(matches!(
            f.guard.evaluate(&different).await.unwrap(),
            Verdict::NeedsAction(_)
        ));

        let missing = hand_off(Condition::same(
            Operand::deployment("Gadget"),
            Operand::Zero,
        ));
        assert_eq!(
            f.guard.evaluate(&missing).await.unwrap_err(),
            GuardError::MissingDeployment("Gadget".into())
        );
    }

    #[tokio::test]
    async fn transient_read_failures_are_retried() {
        let f = fixture();
        f.ledger.fail_next_reads(2);

        let verdict = f.guard.evaluate(&deploy_task("Widget", vec![])).await.unwrap();
        assert!(matches!(verdict, Verdict::NeedsAction(_)));
        assert_eq!(f.ledger.stats().reads, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_infrastructure_failure() {
        let f = fixture();
        f.ledger.fail_next_reads(10);

        let err = f.guard.evaluate(&deploy_task("Widget", vec![])).await.unwrap_err();
        assert!(matches!(
            err.into_failure(),
            FailureReason::Infrastructure { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_accounts_are_evaluation_errors() {
        let f = fixture();
        let task = deploy_task("Widget", vec![Operand::Account(Role::new("treasury"))]);
        external_deploy(&f, "Widget", vec![]);

        let err = f.guard.evaluate(&task).await.unwrap_err();
        assert_eq!(err, GuardError::UnknownAccount(Role::new("treasury")));
    }
}
