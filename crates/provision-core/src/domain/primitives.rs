//! Ledger primitives: addresses, 32-byte words, interface ids, and the
//! Keccak-256 derived hashes used to name things on-chain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Error returned when parsing hex-encoded primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// Keccak-256 of `data`.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data.as_ref());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(ParseError::WrongLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! hex_newtype {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(s).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.to_string()
            }
        }
    };
}

/// Opaque 20-byte identifier of an account or deployed component.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

hex_newtype!(Address, 20);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Address from a `0x`-prefixed, 40 digit hex literal. Evaluated in a
    /// `const`, a malformed literal fails the build.
    pub const fn from_literal(literal: &str) -> Self {
        let digits = literal.as_bytes();
        assert!(
            digits.len() == 42 && digits[0] == b'0' && digits[1] == b'x',
            "address literal must be 0x followed by 40 hex digits"
        );
        let mut out = [0u8; 20];
        let mut i = 0;
        while i < 20 {
            out[i] = (hex_digit(digits[2 + 2 * i]) << 4) | hex_digit(digits[3 + 2 * i]);
            i += 1;
        }
        Self(out)
    }

    /// Takes the low 20 bytes of a 32-byte hash.
    pub fn from_word(word: &[u8; 32]) -> Self {
        let mut out = [0u8; 20];
        out.copy_from_slice(&word[12..]);
        Self(out)
    }
}

const fn hex_digit(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in address literal"),
    }
}

/// A 32-byte word: name nodes, label hashes, raw storage values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bytes32([u8; 32]);

hex_newtype!(Bytes32, 32);

impl Bytes32 {
    pub const ZERO: Bytes32 = Bytes32([0u8; 32]);
}

/// Hash identifying a hierarchical name.
pub type NameNode = Bytes32;

/// ERC-165 interface identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceId([u8; 4]);

hex_newtype!(InterfaceId, 4);

impl InterfaceId {
    /// XOR of the selectors of every function in the interface.
    pub fn from_signatures<S: AsRef<str>>(signatures: &[S]) -> Self {
        let mut id = [0u8; 4];
        for sig in signatures {
            let sel = selector(sig.as_ref());
            for (acc, b) in id.iter_mut().zip(sel) {
                *acc ^= b;
            }
        }
        Self(id)
    }
}

/// First four bytes of the Keccak-256 of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Keccak-256 of a single label.
pub fn labelhash(label: &str) -> Bytes32 {
    Bytes32(keccak256(label.to_ascii_lowercase().as_bytes()))
}

/// Node of `label` under `parent`.
pub fn subnode(parent: &NameNode, label: &Bytes32) -> NameNode {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(parent.as_bytes());
    buf[32..].copy_from_slice(label.as_bytes());
    Bytes32(keccak256(buf))
}

/// Recursive name hash: the empty name maps to the zero node, and
/// `label.rest` maps to `keccak256(namehash(rest) ++ labelhash(label))`.
pub fn namehash(name: &str) -> NameNode {
    let mut node = Bytes32::ZERO;
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        node = subnode(&node, &labelhash(label));
    }
    node
}
