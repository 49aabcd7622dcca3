//! Signer port - 署名の抽象化と、ロールから signer への対応表（Accounts）

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::{Address, Role};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("signer {0} is locked")]
    Locked(Address),

    #[error("signing failed: {0}")]
    Failed(String),
}

/// Produces signatures on behalf of one account.
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// Accounts は run の名前付きアカウント
///
/// 全ロールがアドレスを持ち、タスクの `from` になるロールは signer も持つ必要があります。
#[derive(Clone, Default)]
pub struct Accounts {
    addresses: BTreeMap<Role, Address>,
    signers: BTreeMap<Role, Arc<dyn Signer>>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer(mut self, role: Role, signer: Arc<dyn Signer>) -> Self {
        self.insert_signer(role, signer);
        self
    }

    pub fn with_address(mut self, role: Role, address: Address) -> Self {
        self.addresses.insert(role, address);
        self
    }

    pub fn insert_signer(&mut self, role: Role, signer: Arc<dyn Signer>) {
        self.addresses.insert(role.clone(), signer.address());
        self.signers.insert(role, signer);
    }

    pub fn address(&self, role: &Role) -> Option<Address> {
        self.addresses.get(role).copied()
    }

    pub fn signer(&self, role: &Role) -> Option<Arc<dyn Signer>> {
        self.signers.get(role).cloned()
    }

    pub fn has_signer(&self, role: &Role) -> bool {
        self.signers.contains_key(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.addresses.keys()
    }
}

impl fmt::Debug for Accounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (role, address) in &self.addresses {
            let signs = self.signers.contains_key(role);
            map.entry(&role.as_str(), &format_args!("{address} (signer: {signs})"));
        }
        map.finish()
    }
}
