//! The closed set of key manager methods a remote caller may invoke.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// A whitelisted key manager method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyMethod {
    Sign,
    GetPublicKey,
    DeriveSharedSecret,
    Decrypt,
}

impl KeyMethod {
    pub const ALL: [KeyMethod; 4] = [
        KeyMethod::Sign,
        KeyMethod::GetPublicKey,
        KeyMethod::DeriveSharedSecret,
        KeyMethod::Decrypt,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyMethod::Sign => "sign",
            KeyMethod::GetPublicKey => "getPublicKey",
            KeyMethod::DeriveSharedSecret => "deriveSharedSecret",
            KeyMethod::Decrypt => "decrypt",
        }
    }

    /// Number of positional arguments the method takes.
    pub fn arity(&self) -> usize {
        match self {
            KeyMethod::GetPublicKey => 0,
            _ => 1,
        }
    }
}

impl FromStr for KeyMethod {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| RpcError::InvalidMethod(s.to_owned()))
    }
}

impl fmt::Display for KeyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
