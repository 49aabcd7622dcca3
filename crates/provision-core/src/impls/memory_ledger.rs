//! InMemoryLedger - 開発用・テスト用の ledger シミュレーション
//!
//! ネーミングシステムのプロビジョニングに必要な分だけを模倣します:
//! ownable なコンポーネント、controller 集合、ノードごとの owner と resolver を持つ
//! registry、interface バインディング、アドレスレコード、コレクション許可リスト。
//! 未知のエントリポイントは revert します。
//!
//! # 学習ポイント
//! - Mutex で囲った状態と、await をまたがないロック
//! - write 時に検証し、確定時に適用（`confirm_after_polls` 回目の status で確定）
//! - 障害注入（fail_next_*, stall_confirmations, revert_on）でリトライとタイムアウトを検証
//! - serde_json による状態のスナップショット

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::domain::{
    Address, Bytes32, InterfaceId, PendingTransaction, ReadRequest, SubmissionId, TxStatus, Value,
    WriteKind, WriteRequest, keccak256, labelhash, subnode,
};
use crate::ports::{
    Deployment, IdGenerator, LedgerClient, LedgerError, Signer, SystemClock, UlidGenerator,
};

/// Label registered by a registrar's `registerResolver` entry point.
const RESOLVER_LABEL: &str = "resolver";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format: {0}")]
    Format(#[from] serde_json::Error),
}

/// State of one deployed component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub contract: String,
    pub owner: Address,
    pub args: Vec<Value>,
    #[serde(default)]
    pub slots: BTreeMap<String, Value>,
}

/// Confirmed ledger state; what `save` writes and `load` reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub components: BTreeMap<Address, ComponentState>,
    #[serde(default)]
    pub deployments: BTreeMap<String, Deployment>,
    #[serde(default)]
    pub nonces: BTreeMap<Address, u64>,
}

/// Request counters, for asserting on ledger traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub reads: u64,
    pub writes: u64,
    pub polls: u64,
    /// Highest number of unconfirmed writes one account ever had at once.
    pub max_in_flight_per_signer: usize,
}

#[derive(Debug, Default)]
struct Faults {
    unreachable_reads: u32,
    unreachable_writes: u32,
    unreachable_polls: u32,
    stall_confirmations: bool,
    reverting: BTreeSet<String>,
}

#[derive(Debug)]
struct Pending {
    request: WriteRequest,
    from: Address,
    nonce: u64,
    polls: u32,
    status: TxStatus,
}

#[derive(Debug, Default)]
struct State {
    world: LedgerSnapshot,
    pending: HashMap<SubmissionId, Pending>,
    faults: Faults,
    stats: LedgerStats,
}

pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
    ids: Arc<dyn IdGenerator>,
    confirm_after_polls: u32,
    latency: Duration,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::from_snapshot(LedgerSnapshot::default())
    }

    pub fn from_snapshot(world: LedgerSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                world,
                ..State::default()
            })),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            confirm_after_polls: 1,
            latency: Duration::ZERO,
        }
    }

    /// Load a snapshot file, or start empty when it does not exist yet.
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            debug!(path = %path.display(), "no ledger snapshot, starting empty");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let world: LedgerSnapshot = serde_json::from_str(&raw)?;
        debug!(
            path = %path.display(),
            components = world.components.len(),
            "loaded ledger snapshot"
        );
        Ok(Self::from_snapshot(world))
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.lock().world.clone()
    }

    /// Number of status polls after which a write confirms (minimum 1).
    pub fn with_confirmation_polls(mut self, polls: u32) -> Self {
        self.confirm_after_polls = polls.max(1);
        self
    }

    /// Simulated round-trip time added to every request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.lock().faults.unreachable_reads = count;
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.lock().faults.unreachable_writes = count;
    }

    pub fn fail_next_polls(&self, count: u32) {
        self.lock().faults.unreachable_polls = count;
    }

    /// Keep every submitted write in `Submitted` forever.
    pub fn stall_confirmations(&self, stall: bool) {
        self.lock().faults.stall_confirmations = stall;
    }

    /// Reject any write to `selector`, or any deploy of a contract named
    /// `selector`.
    pub fn revert_on(&self, selector: &str) {
        self.lock().faults.reverting.insert(selector.to_string());
    }

    pub fn stats(&self) -> LedgerStats {
        self.lock().stats
    }

    pub fn reset_stats(&self) {
        self.lock().stats = LedgerStats::default();
    }

    /// Apply a write immediately, as a party outside the orchestrator would.
    /// Bypasses faults and counters.
    pub fn apply_external(
        &self,
        request: &WriteRequest,
        signer: &dyn Signer,
    ) -> Result<(), LedgerError> {
        let from = signer.address();
        let mut state = self.lock();
        let nonce = state.world.nonces.get(&from).copied().unwrap_or(0);
        execute(&mut state.world, request, from, nonce)?;
        *state.world.nonces.entry(from).or_default() += 1;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn read(&self, request: &ReadRequest) -> Result<Value, LedgerError> {
        self.round_trip().await;
        let mut state = self.lock();
        state.stats.reads += 1;
        if state.faults.unreachable_reads > 0 {
            state.faults.unreachable_reads -= 1;
            return Err(LedgerError::Unreachable("read dropped".to_string()));
        }
        let value = query(&state.world, request)?;
        trace!(%request, %value, "read");
        Ok(value)
    }

    async fn write(
        &self,
        request: &WriteRequest,
        signer: &dyn Signer,
    ) -> Result<PendingTransaction, LedgerError> {
        self.round_trip().await;
        let from = signer.address();
        let mut state = self.lock();
        state.stats.writes += 1;
        if state.faults.unreachable_writes > 0 {
            state.faults.unreachable_writes -= 1;
            return Err(LedgerError::Unreachable("write dropped".to_string()));
        }
        let entry_point = match &request.kind {
            WriteKind::Deploy { contract } => contract.as_str(),
            WriteKind::Call { selector, .. } => selector.as_str(),
        };
        if state.faults.reverting.contains(entry_point) {
            return Err(LedgerError::Reverted(format!("{entry_point} reverted")));
        }

        let nonce = state.world.nonces.get(&from).copied().unwrap_or(0);
        signer
            .sign(&request.signing_payload(nonce))
            .map_err(|e| LedgerError::Unauthorized(e.to_string()))?;

        // Validate against current state without committing.
        let mut scratch = state.world.clone();
        execute(&mut scratch, request, from, nonce)?;

        *state.world.nonces.entry(from).or_default() += 1;
        let in_flight = 1 + state
            .pending
            .values()
            .filter(|p| p.from == from && !p.status.is_terminal())
            .count();
        state.stats.max_in_flight_per_signer = state.stats.max_in_flight_per_signer.max(in_flight);

        let submission_id = self.ids.generate_submission_id();
        state.pending.insert(
            submission_id,
            Pending {
                request: request.clone(),
                from,
                nonce,
                polls: 0,
                status: TxStatus::Submitted,
            },
        );
        debug!(%submission_id, %from, nonce, %request, "write accepted");

        Ok(PendingTransaction {
            submission_id,
            task_id: request.task_id.clone(),
            from,
            nonce,
            status: TxStatus::Submitted,
        })
    }

    async fn status(&self, submission: &SubmissionId) -> Result<TxStatus, LedgerError> {
        self.round_trip().await;
        let mut guard = self.lock();
        let state = &mut *guard;
        state.stats.polls += 1;
        if state.faults.unreachable_polls > 0 {
            state.faults.unreachable_polls -= 1;
            return Err(LedgerError::Unreachable("status poll dropped".to_string()));
        }

        let stall = state.faults.stall_confirmations;
        let pending = state
            .pending
            .get_mut(submission)
            .ok_or(LedgerError::UnknownSubmission(*submission))?;
        if pending.status.is_terminal() {
            return Ok(pending.status.clone());
        }
        pending.polls += 1;
        if stall || pending.polls < self.confirm_after_polls {
            return Ok(TxStatus::Submitted);
        }

        pending.status = match execute(&mut state.world, &pending.request, pending.from, pending.nonce)
        {
            Ok(()) => TxStatus::Confirmed,
            Err(e) => TxStatus::Failed {
                reason: e.to_string(),
            },
        };
        debug!(%submission, status = ?pending.status, "write settled");
        Ok(pending.status.clone())
    }

    async fn deployment(&self, name: &str) -> Result<Option<Deployment>, LedgerError> {
        self.round_trip().await;
        let mut state = self.lock();
        state.stats.reads += 1;
        if state.faults.unreachable_reads > 0 {
            state.faults.unreachable_reads -= 1;
            return Err(LedgerError::Unreachable("deployment lookup dropped".to_string()));
        }
        Ok(state.world.deployments.get(name).cloned())
    }
}

fn owner_key(node: &Bytes32) -> String {
    format!("owner/{node}")
}

fn resolver_key(node: &Bytes32) -> String {
    format!("resolver/{node}")
}

fn controller_key(who: &Address) -> String {
    format!("controllers/{who}")
}

fn interface_key(node: &Bytes32, id: &InterfaceId) -> String {
    format!("interface/{node}/{id}")
}

fn addr_key(node: &Bytes32) -> String {
    format!("addr/{node}")
}

fn collection_key(collection: &Address) -> String {
    format!("collections/{collection}")
}

fn slot_or(component: &ComponentState, key: &str, default: Value) -> Value {
    component.slots.get(key).cloned().unwrap_or(default)
}

fn node_owner(component: &ComponentState, node: &Bytes32) -> Address {
    component
        .slots
        .get(&owner_key(node))
        .and_then(Value::as_address)
        .unwrap_or(Address::ZERO)
}

fn arg(args: &[Value], index: usize) -> Result<&Value, LedgerError> {
    args.get(index)
        .ok_or_else(|| LedgerError::Reverted(format!("missing argument {index}")))
}

fn arg_address(args: &[Value], index: usize) -> Result<Address, LedgerError> {
    arg(args, index)?
        .as_address()
        .ok_or_else(|| LedgerError::Reverted(format!("argument {index} is not an address")))
}

fn arg_word(args: &[Value], index: usize) -> Result<Bytes32, LedgerError> {
    arg(args, index)?
        .as_bytes32()
        .ok_or_else(|| LedgerError::Reverted(format!("argument {index} is not a bytes32")))
}

fn arg_bool(args: &[Value], index: usize) -> Result<bool, LedgerError> {
    arg(args, index)?
        .as_bool()
        .ok_or_else(|| LedgerError::Reverted(format!("argument {index} is not a bool")))
}

fn arg_interface(args: &[Value], index: usize) -> Result<InterfaceId, LedgerError> {
    match arg(args, index)? {
        Value::Bytes4(id) => Ok(*id),
        _ => Err(LedgerError::Reverted(format!(
            "argument {index} is not an interface id"
        ))),
    }
}

fn component<'a>(
    world: &'a LedgerSnapshot,
    at: &Address,
) -> Result<&'a ComponentState, LedgerError> {
    world
        .components
        .get(at)
        .ok_or_else(|| LedgerError::Reverted(format!("no component at {at}")))
}

/// Registry address and base node a registrar was constructed with.
fn registrar_config(registrar: &ComponentState) -> Result<(Address, Bytes32), LedgerError> {
    Ok((arg_address(&registrar.args, 0)?, arg_word(&registrar.args, 1)?))
}

fn query(world: &LedgerSnapshot, request: &ReadRequest) -> Result<Value, LedgerError> {
    let c = component(world, &request.target)?;
    let args = &request.args;
    let value = match request.query.as_str() {
        "owner" if args.is_empty() => Value::Address(c.owner),
        "owner" => Value::Address(node_owner(c, &arg_word(args, 0)?)),
        "resolver" => slot_or(c, &resolver_key(&arg_word(args, 0)?), Value::Address(Address::ZERO)),
        "controllers" => slot_or(c, &controller_key(&arg_address(args, 0)?), Value::Bool(false)),
        "interfaceImplementer" => slot_or(
            c,
            &interface_key(&arg_word(args, 0)?, &arg_interface(args, 1)?),
            Value::Address(Address::ZERO),
        ),
        "addr" => slot_or(c, &addr_key(&arg_word(args, 0)?), Value::Address(Address::ZERO)),
        "nftContracts" => slot_or(c, &collection_key(&arg_address(args, 0)?), Value::Bool(false)),
        "available" => {
            let (registry, base) = registrar_config(c)?;
            let node = subnode(&base, &arg_word(args, 0)?);
            Value::Bool(node_owner(component(world, &registry)?, &node).is_zero())
        }
        other => {
            return Err(LedgerError::Reverted(format!(
                "{} has no query {other}",
                c.contract
            )));
        }
    };
    Ok(value)
}

fn execute(
    world: &mut LedgerSnapshot,
    request: &WriteRequest,
    from: Address,
    nonce: u64,
) -> Result<(), LedgerError> {
    match &request.kind {
        WriteKind::Deploy { contract } => {
            deploy(world, contract, &request.args, from, nonce);
            Ok(())
        }
        WriteKind::Call { target, selector } if selector.as_str() == "registerResolver" => {
            register_resolver(world, *target, from)
        }
        WriteKind::Call { target, selector } => {
            let c = world
                .components
                .get_mut(target)
                .ok_or_else(|| LedgerError::Reverted(format!("no component at {target}")))?;
            call(c, selector.as_str(), &request.args, from)
        }
    }
}

fn deploy(world: &mut LedgerSnapshot, contract: &str, args: &[Value], from: Address, nonce: u64) {
    let mut seed = Vec::with_capacity(28);
    seed.extend_from_slice(from.as_bytes());
    seed.extend_from_slice(&nonce.to_be_bytes());
    let address = Address::from_word(&keccak256(seed));

    let mut state = ComponentState {
        contract: contract.to_string(),
        owner: from,
        args: args.to_vec(),
        slots: BTreeMap::new(),
    };
    if contract.ends_with("Registry") {
        // The registry deployer owns the root node.
        state
            .slots
            .insert(owner_key(&Bytes32::ZERO), Value::Address(from));
    }
    world.components.insert(address, state);
    world.deployments.insert(
        contract.to_string(),
        Deployment {
            name: contract.to_string(),
            address,
            args: args.to_vec(),
            deployer: from,
        },
    );
}

fn only_owner(c: &ComponentState, from: Address) -> Result<(), LedgerError> {
    if c.owner == from {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized(format!(
            "{from} is not the owner of {}",
            c.contract
        )))
    }
}

fn only_node_owner(c: &ComponentState, node: &Bytes32, from: Address) -> Result<(), LedgerError> {
    if node_owner(c, node) == from {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized(format!(
            "{from} does not own node {node}"
        )))
    }
}

fn call(
    c: &mut ComponentState,
    selector: &str,
    args: &[Value],
    from: Address,
) -> Result<(), LedgerError> {
    match selector {
        "transferOwnership" => {
            only_owner(c, from)?;
            c.owner = arg_address(args, 0)?;
        }
        "addController" | "removeController" => {
            only_owner(c, from)?;
            let who = arg_address(args, 0)?;
            c.slots
                .insert(controller_key(&who), Value::Bool(selector == "addController"));
        }
        "setController" => {
            only_owner(c, from)?;
            let who = arg_address(args, 0)?;
            let enabled = arg_bool(args, 1)?;
            c.slots.insert(controller_key(&who), Value::Bool(enabled));
        }
        "setSubnodeOwner" => {
            let node = arg_word(args, 0)?;
            let label = arg_word(args, 1)?;
            let owner = arg_address(args, 2)?;
            only_node_owner(c, &node, from)?;
            c.slots
                .insert(owner_key(&subnode(&node, &label)), Value::Address(owner));
        }
        "setOwner" => {
            let node = arg_word(args, 0)?;
            let owner = arg_address(args, 1)?;
            only_node_owner(c, &node, from)?;
            c.slots.insert(owner_key(&node), Value::Address(owner));
        }
        "setResolver" => {
            let node = arg_word(args, 0)?;
            let resolver = arg_address(args, 1)?;
            only_node_owner(c, &node, from)?;
            c.slots.insert(resolver_key(&node), Value::Address(resolver));
        }
        "setInterface" => {
            only_owner(c, from)?;
            let node = arg_word(args, 0)?;
            let id = arg_interface(args, 1)?;
            let implementer = arg_address(args, 2)?;
            c.slots
                .insert(interface_key(&node, &id), Value::Address(implementer));
        }
        "setAddr" => {
            only_owner(c, from)?;
            let node = arg_word(args, 0)?;
            let addr = arg_address(args, 1)?;
            c.slots.insert(addr_key(&node), Value::Address(addr));
        }
        "addCollection" => {
            only_owner(c, from)?;
            let collection = arg_address(args, 0)?;
            c.slots.insert(collection_key(&collection), Value::Bool(true));
        }
        other => {
            return Err(LedgerError::Reverted(format!(
                "{} has no entry point {other}",
                c.contract
            )));
        }
    }
    Ok(())
}

/// A registrar that owns its base node claims `resolver.<base>` for the
/// caller.
fn register_resolver(
    world: &mut LedgerSnapshot,
    registrar_at: Address,
    from: Address,
) -> Result<(), LedgerError> {
    let registrar = component(world, &registrar_at)?;
    only_owner(registrar, from)?;
    let (registry_at, base) = registrar_config(registrar)?;

    let registry = world
        .components
        .get_mut(&registry_at)
        .ok_or_else(|| LedgerError::Reverted(format!("no registry at {registry_at}")))?;
    if node_owner(registry, &base) != registrar_at {
        return Err(LedgerError::Reverted(
            "registrar does not own its base node".to_string(),
        ));
    }
    let node = subnode(&base, &labelhash(RESOLVER_LABEL));
    if !node_owner(registry, &node).is_zero() {
        return Err(LedgerError::Reverted("resolver name is taken".to_string()));
    }
    registry.slots.insert(owner_key(&node), Value::Address(from));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Role, TaskId, namehash};
    use crate::impls::LocalSigner;

    fn deployer() -> LocalSigner {
        LocalSigner::dev(&Role::deployer())
    }

    fn stranger() -> LocalSigner {
        LocalSigner::dev(&Role::new("stranger"))
    }

    async fn confirm(ledger: &InMemoryLedger, request: WriteRequest, signer: &dyn Signer) {
        let tx = ledger.write(&request, signer).await.unwrap();
        assert_eq!(ledger.status(&tx.submission_id).await.unwrap(), TxStatus::Confirmed);
    }

    async fn deploy_named(ledger: &InMemoryLedger, name: &str, args: Vec<Value>) -> Address {
        confirm(
            ledger,
            WriteRequest::deploy(TaskId::from(name), name, args),
            &deployer(),
        )
        .await;
        ledger.deployment(name).await.unwrap().unwrap().address
    }

    fn read(target: Address, query: &str, args: Vec<Value>) -> ReadRequest {
        ReadRequest::new(target, query, args)
    }

    #[tokio::test]
    async fn deploy_becomes_visible_only_after_confirmation() {
        let ledger = InMemoryLedger::new().with_confirmation_polls(2);
        let request = WriteRequest::deploy(TaskId::from("t"), "Widget", vec![Value::Uint(1)]);
        let tx = ledger.write(&request, &deployer()).await.unwrap();

        assert_eq!(tx.nonce, 0);
        assert!(ledger.deployment("Widget").await.unwrap().is_none());
        assert_eq!(ledger.status(&tx.submission_id).await.unwrap(), TxStatus::Submitted);
        assert_eq!(ledger.status(&tx.submission_id).await.unwrap(), TxStatus::Confirmed);

        let deployment = ledger.deployment("Widget").await.unwrap().unwrap();
        assert_eq!(deployment.args, vec![Value::Uint(1)]);
        assert_eq!(deployment.deployer, deployer().address());
    }

    #[tokio::test]
    async fn ownable_entry_points_reject_strangers_at_submission() {
        let ledger = InMemoryLedger::new();
        let widget = deploy_named(&ledger, "Widget", vec![]).await;

        let request = WriteRequest::call(
            TaskId::from("t"),
            widget,
            "addController",
            vec![Value::Address(stranger().address())],
        );
        let err = ledger.write(&request, &stranger()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized(_)));

        confirm(&ledger, request, &deployer()).await;
        let is_controller = ledger
            .read(&read(widget, "controllers", vec![Value::Address(stranger().address())]))
            .await
            .unwrap();
        assert_eq!(is_controller, Value::Bool(true));
    }

    #[tokio::test]
    async fn registry_nodes_follow_their_owners() {
        let ledger = InMemoryLedger::new();
        let registry = deploy_named(&ledger, "ENSRegistry", vec![]).await;
        let owner = stranger();

        confirm(
            &ledger,
            WriteRequest::call(
                TaskId::from("claim"),
                registry,
                "setSubnodeOwner",
                vec![
                    Value::Bytes32(Bytes32::ZERO),
                    Value::Bytes32(labelhash("eth")),
                    Value::Address(owner.address()),
                ],
            ),
            &deployer(),
        )
        .await;

        let eth_owner = ledger
            .read(&read(registry, "owner", vec![Value::Bytes32(namehash("eth"))]))
            .await
            .unwrap();
        assert_eq!(eth_owner, Value::Address(owner.address()));

        // The root owner no longer controls eth's children directly.
        let err = ledger
            .write(
                &WriteRequest::call(
                    TaskId::from("steal"),
                    registry,
                    "setOwner",
                    vec![
                        Value::Bytes32(namehash("eth")),
                        Value::Address(deployer().address()),
                    ],
                ),
                &deployer(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn registrar_registers_resolver_name_once_it_owns_the_base() {
        let ledger = InMemoryLedger::new();
        let base = namehash("remilias.eth");
        let registry = deploy_named(&ledger, "ENSRegistry", vec![]).await;
        let registrar = deploy_named(
            &ledger,
            "RemiliasRegistrar",
            vec![Value::Address(registry), Value::Bytes32(base)],
        )
        .await;
        let available = read(registrar, "available", vec![Value::Bytes32(labelhash("resolver"))]);
        let register = WriteRequest::call(TaskId::from("reg"), registrar, "registerResolver", vec![]);

        let err = ledger.write(&register, &deployer()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));

        for (node, label) in [(Bytes32::ZERO, "eth"), (namehash("eth"), "remilias")] {
            confirm(
                &ledger,
                WriteRequest::call(
                    TaskId::from("claim"),
                    registry,
                    "setSubnodeOwner",
                    vec![
                        Value::Bytes32(node),
                        Value::Bytes32(labelhash(label)),
                        Value::Address(deployer().address()),
                    ],
                ),
                &deployer(),
            )
            .await;
        }
        confirm(
            &ledger,
            WriteRequest::call(
                TaskId::from("hand"),
                registry,
                "setOwner",
                vec![Value::Bytes32(base), Value::Address(registrar)],
            ),
            &deployer(),
        )
        .await;

        assert_eq!(ledger.read(&available).await.unwrap(), Value::Bool(true));
        confirm(&ledger, register.clone(), &deployer()).await;
        assert_eq!(ledger.read(&available).await.unwrap(), Value::Bool(false));
        assert!(ledger.write(&register, &deployer()).await.is_err());
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let ledger = InMemoryLedger::new();
        ledger.fail_next_reads(1);

        let err = ledger.deployment("Widget").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(ledger.deployment("Widget").await.unwrap().is_none());
        assert_eq!(ledger.stats().reads, 2);
    }

    #[tokio::test]
    async fn stalled_writes_stay_submitted() {
        let ledger = InMemoryLedger::new();
        ledger.stall_confirmations(true);
        let tx = ledger
            .write(&WriteRequest::deploy(TaskId::from("t"), "Widget", vec![]), &deployer())
            .await
            .unwrap();

        for _ in 0..3 {
            assert_eq!(ledger.status(&tx.submission_id).await.unwrap(), TxStatus::Submitted);
        }
    }

    #[tokio::test]
    async fn reverting_entry_points_are_rejected() {
        let ledger = InMemoryLedger::new();
        ledger.revert_on("Widget");
        let err = ledger
            .write(&WriteRequest::deploy(TaskId::from("t"), "Widget", vec![]), &deployer())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[tokio::test]
    async fn snapshot_survives_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = InMemoryLedger::new();
        let widget = deploy_named(&ledger, "Widget", vec![Value::Text("x".into())]).await;
        ledger.save(&path).unwrap();

        let reopened = InMemoryLedger::open(&path).unwrap();
        let deployment = reopened.deployment("Widget").await.unwrap().unwrap();
        assert_eq!(deployment.address, widget);
        assert_eq!(reopened.snapshot(), ledger.snapshot());
    }

    #[test]
    fn opening_a_missing_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = InMemoryLedger::open(&dir.path().join("absent.json")).unwrap();
        assert_eq!(ledger.snapshot(), LedgerSnapshot::default());
    }
}
