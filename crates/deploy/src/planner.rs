//! Deterministic (CREATE2) address planning.

use std::{fmt, str::FromStr};

use alloy_core::primitives::{Address, B256, keccak256};
use serde::{Deserialize, Serialize};

use crate::{
    abi::ConstructorArgs,
    error::{DeployError, Result},
};

/// Prefix byte of the CREATE2 address preimage.
const CREATE2_PREFIX: u8 = 0xff;

/// A 32-byte CREATE2 salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Salt(B256);

impl Salt {
    /// Derive a salt from a human readable label as `keccak256(label)`.
    pub fn from_label(label: &str) -> Self {
        Self(keccak256(label.as_bytes()))
    }

    pub const fn from_b256(salt: B256) -> Self {
        Self(salt)
    }

    pub const fn as_b256(&self) -> B256 {
        self.0
    }
}

impl FromStr for Salt {
    type Err = DeployError;

    /// A `0x`-prefixed value must be 32 bytes of hex and is taken verbatim; anything
    /// else is a label.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(DeployError::config("salt must not be empty"));
        }
        if let Some(hex) = s.strip_prefix("0x") {
            if hex.len() != 64 {
                return Err(DeployError::config(format!(
                    "hex salt `{s}` must be 32 bytes, got {} hex digits",
                    hex.len()
                )));
            }
            let raw = B256::from_str(s)
                .map_err(|e| DeployError::config(format!("invalid hex salt `{s}`: {e}")))?;
            return Ok(Self(raw));
        }
        Ok(Self::from_label(s))
    }
}

impl TryFrom<String> for Salt {
    type Error = DeployError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Salt> for String {
    fn from(salt: Salt) -> Self {
        salt.0.to_string()
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The bytes sent to the CREATE2 deployer: init code followed by encoded constructor args.
pub fn creation_code(init_code: &[u8], args: &ConstructorArgs) -> Result<Vec<u8>> {
    let mut code = init_code.to_vec();
    code.extend(args.encode()?);
    Ok(code)
}

/// Compute the address a CREATE2 deployer at `factory` will place the contract at.
pub fn plan(
    factory: Address,
    salt: Salt,
    init_code: &[u8],
    args: &ConstructorArgs,
) -> Result<Address> {
    let code_hash = keccak256(creation_code(init_code, args)?);

    let mut preimage = [0u8; 85];
    preimage[0] = CREATE2_PREFIX;
    preimage[1..21].copy_from_slice(factory.as_slice());
    preimage[21..53].copy_from_slice(salt.as_b256().as_slice());
    preimage[53..].copy_from_slice(code_hash.as_slice());

    Ok(Address::from_slice(&keccak256(preimage)[12..]))
}
