//! Values exchanged with the ledger.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::primitives::{Address, Bytes32, InterfaceId};

/// Name of a read query or write entry point on a component, e.g. `owner`
/// or `addController`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selector(String);

impl Selector {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A concrete argument or read result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    None,
    Bool(bool),
    Uint(u64),
    Address(Address),
    Bytes32(Bytes32),
    Bytes4(InterfaceId),
    Text(String),
}

impl Value {
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_bytes32(&self) -> Option<Bytes32> {
        match self {
            Value::Bytes32(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True for the zero value of the variant (zero address, `false`, `0`,
    /// empty text) and for `None`.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::None => true,
            Value::Bool(b) => !b,
            Value::Uint(n) => *n == 0,
            Value::Address(a) => a.is_zero(),
            Value::Bytes32(b) => b.is_zero(),
            Value::Bytes4(i) => i.is_zero(),
            Value::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Uint(n) => write!(f, "{n}"),
            Value::Address(a) => write!(f, "{a}"),
            Value::Bytes32(b) => write!(f, "{b}"),
            Value::Bytes4(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// Renders `a, b, c` for logs and request descriptions.
pub fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::none(Value::None, true)]
    #[case::false_bool(Value::Bool(false), true)]
    #[case::true_bool(Value::Bool(true), false)]
    #[case::zero_address(Value::Address(Address::ZERO), true)]
    #[case::zero_word(Value::Bytes32(Bytes32::ZERO), true)]
    #[case::uint(Value::Uint(4176), false)]
    fn zero_detection(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_zero(), expected);
    }

    #[test]
    fn values_serialize_with_type_tag() {
        let json = serde_json::to_value(Value::Bool(true)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "bool", "value": true}));
    }
}
