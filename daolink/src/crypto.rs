//! Primitive chain-facing types: account addresses, hashes and block references.
//!
//! The exact representations are an implementation detail of this module. Dependents should only
//! rely on the conversions exposed here, so the underlying encodings can change without churn.

use std::fmt::Display;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// A 32-byte account identifier, as used by the target contracts.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex")] pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0; 32]);

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Address> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes: [u8; 32] = hex::decode(s)?
            .try_into()
            .map_err(|v: Vec<u8>| anyhow!("invalid address length: {}", v.len()))?;
        Ok(Address(bytes))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.as_bytes()))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.as_bytes()))
    }
}

impl std::str::FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::from_hex(s)
    }
}

/// A 32-byte block hash.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(#[serde(with = "hex")] pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0; 32]);

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.as_bytes()))
    }
}

/// A reference to a block a transaction was seen in. The hash disambiguates competing blocks at
/// the same height after a reorg.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub hash: Hash,
}

impl Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}
