//! LocalSigner - プロセス内に鍵を持つ signer
//!
//! ローカル / in-memory の ledger 向けです。アドレスは `keccak256(secret)` の下位
//! 20 バイト、署名は `keccak256(secret ++ payload)`。ECDSA 署名ではなく鍵付きダイジェストなので、
//! プロセスを信頼する ledger でのみ意味を持ちます。

use std::fmt;

use crate::domain::{Address, Role, keccak256};
use crate::ports::{Signer, SignerError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key is not valid hex: {0}")]
    InvalidHex(String),

    #[error("key must be 32 bytes, got {0}")]
    WrongLength(usize),
}

#[derive(Clone)]
pub struct LocalSigner {
    secret: [u8; 32],
    address: Address,
}

impl LocalSigner {
    pub fn from_secret(secret: [u8; 32]) -> Self {
        let address = Address::from_word(&keccak256(secret));
        Self { secret, address }
    }

    /// Parse a hex-encoded 32-byte key, with or without `0x`.
    pub fn from_hex(key: &str) -> Result<Self, KeyError> {
        let digits = key.trim().strip_prefix("0x").unwrap_or(key.trim());
        let bytes = hex::decode(digits).map_err(|e| KeyError::InvalidHex(e.to_string()))?;
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::WrongLength(bytes.len()))?;
        Ok(Self::from_secret(secret))
    }

    /// Deterministic development account for `role`.
    pub fn dev(role: &Role) -> Self {
        Self::from_secret(keccak256(format!("provision-dev:{role}")))
    }
}

impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError> {
        let mut buf = Vec::with_capacity(32 + payload.len());
        buf.extend_from_slice(&self.secret);
        buf.extend_from_slice(payload);
        Ok(keccak256(buf).to_vec())
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
