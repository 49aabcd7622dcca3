//! OrchestratorBuilder - Orchestrator の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装（未指定の port はデフォルト実装）
//! - 起動時検証（Fail-fast 設計）: ledger に触れる前にアカウント不足を検出
//! - 開発体験の改善（不足しているロールをまとめて報告）

use std::sync::Arc;
use std::time::Duration;

use crate::app::guard::IdempotencyGuard;
use crate::app::orchestrator::Orchestrator;
use crate::app::resolver::ResolvedGraph;
use crate::app::retry::RetryPolicy;
use crate::app::submitter::{SubmitterConfig, TransactionSubmitter};
use crate::domain::Role;
use crate::ports::{
    Accounts, Clock, EventSink, IdGenerator, LedgerClient, NoopEventSink, SystemClock,
    UlidGenerator,
};

/// OrchestratorBuilder は Orchestrator を構築
///
/// # 使用例
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new(ledger)
///     .accounts(accounts)
///     .expect_manifest(&graph)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_manifest() でマニフェストが使うロールを登録
/// - build() 時に「署名ロール ⊆ signer 登録済み」「参照ロール ⊆ アドレス登録済み」をチェック
/// - 不足があれば BuildError を返す
pub struct OrchestratorBuilder {
    ledger: Arc<dyn LedgerClient>,
    accounts: Accounts,
    submitter: SubmitterConfig,
    read_retry: RetryPolicy,
    read_timeout: Duration,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    parallelism: usize,
    expected_signers: Vec<Role>,
    expected_accounts: Vec<Role>,
}

/// BuildError は構築時のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("no signer configured for accounts {0:?}; these accounts sign writes in the manifest")]
    MissingSigners(Vec<Role>),

    #[error("no address configured for accounts {0:?}; the manifest refers to them")]
    UnknownAccounts(Vec<Role>),
}

impl OrchestratorBuilder {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            accounts: Accounts::new(),
            submitter: SubmitterConfig::default(),
            read_retry: RetryPolicy::default(),
            read_timeout: Duration::from_secs(10),
            events: Arc::new(NoopEventSink),
            clock: Arc::new(SystemClock),
            ids: None,
            parallelism: 1,
            expected_signers: Vec::new(),
            expected_accounts: Vec::new(),
        }
    }

    pub fn accounts(mut self, accounts: Accounts) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn submitter_config(mut self, config: SubmitterConfig) -> Self {
        self.submitter = config;
        self
    }

    pub fn read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// 同時に実行するタスク数。`1` なら解決済みの順序どおりに直列実行
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// `graph` が必要とするアカウントを登録（build() で検証）
    pub fn expect_manifest(mut self, graph: &ResolvedGraph) -> Self {
        for task in graph.tasks() {
            push_unique(&mut self.expected_signers, task.from.clone());
            for role in task.roles() {
                push_unique(&mut self.expected_accounts, role);
            }
        }
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let missing_signers: Vec<Role> = self
            .expected_signers
            .iter()
            .filter(|role| !self.accounts.has_signer(role))
            .cloned()
            .collect();
        if !missing_signers.is_empty() {
            return Err(BuildError::MissingSigners(missing_signers));
        }
        let unknown: Vec<Role> = self
            .expected_accounts
            .iter()
            .filter(|role| self.accounts.address(role).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(BuildError::UnknownAccounts(unknown));
        }

        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(self.clock.clone())),
        };
        let guard = IdempotencyGuard::new(
            self.ledger.clone(),
            self.accounts.clone(),
            self.read_retry,
            self.read_timeout,
        );
        let submitter = TransactionSubmitter::new(self.ledger, self.submitter);
        Ok(Orchestrator::new(
            Arc::new(guard),
            Arc::new(submitter),
            self.accounts,
            self.events,
            self.clock,
            ids,
            self.parallelism,
        ))
    }
}

fn push_unique(roles: &mut Vec<Role>, role: Role) {
    if !roles.contains(&role) {
        roles.push(role);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::resolver::resolve;
    use crate::domain::{ActionTemplate, Condition, Guard, Operand, TaskDecl};
    use crate::impls::{InMemoryLedger, LocalSigner};
    use crate::ports::Signer;

    fn graph() -> ResolvedGraph {
        resolve(vec![
            TaskDecl::new(
                "registry",
                "",
                Guard::satisfied_when(Condition::deployed("Registry")),
                ActionTemplate::deploy("Registry", vec![]),
            ),
            TaskDecl::new(
                "registry.claim",
                "",
                Guard::satisfied_when(Condition::deployed("Registry")),
                ActionTemplate::call(
                    Operand::deployment("Registry"),
                    "transferOwnership",
                    vec![Operand::Account(Role::new("treasury"))],
                ),
            )
            .signed_by(Role::owner())
            .after(&["registry"]),
        ])
        .unwrap()
    }

    fn signer(role: &Role) -> Arc<LocalSigner> {
        Arc::new(LocalSigner::dev(role))
    }

    #[test]
    fn build_success() {
        let accounts = Accounts::new()
            .with_signer(Role::deployer(), signer(&Role::deployer()))
            .with_signer(Role::owner(), signer(&Role::owner()))
            .with_address(Role::new("treasury"), LocalSigner::dev(&Role::new("treasury")).address());
        let built = OrchestratorBuilder::new(Arc::new(InMemoryLedger::new()))
            .accounts(accounts)
            .expect_manifest(&graph())
            .build();
        assert!(built.is_ok());
    }

    #[test]
    fn build_missing_signers() {
        let accounts = Accounts::new().with_signer(Role::deployer(), signer(&Role::deployer()));
        let built = OrchestratorBuilder::new(Arc::new(InMemoryLedger::new()))
            .accounts(accounts)
            .expect_manifest(&graph())
            .build();
        assert!(matches!(
            built,
            Err(BuildError::MissingSigners(missing)) if missing == vec![Role::owner()]
        ));
    }

    #[test]
    fn build_unknown_accounts() {
        let accounts = Accounts::new()
            .with_signer(Role::deployer(), signer(&Role::deployer()))
            .with_signer(Role::owner(), signer(&Role::owner()));
        let built = OrchestratorBuilder::new(Arc::new(InMemoryLedger::new()))
            .accounts(accounts)
            .expect_manifest(&graph())
            .build();
        assert!(matches!(
            built,
            Err(BuildError::UnknownAccounts(unknown)) if unknown == vec![Role::new("treasury")]
        ));
    }

    #[test]
    fn build_without_expectations() {
        let built = OrchestratorBuilder::new(Arc::new(InMemoryLedger::new()))
            .parallelism(0)
            .build();
        assert_eq!(built.map(|o| o.parallelism()).ok(), Some(1));
    }
}
