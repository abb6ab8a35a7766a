//! Router identifiers

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a router identity key in bytes
pub const ROUTER_ID_LEN: usize = 32;

/// A router's Ed25519 identity public key.
///
/// Doubles as the node database key and as the router's coordinate in the
/// DHT keyspace.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RouterId([u8; ROUTER_ID_LEN]);

impl RouterId {
    pub const fn from_bytes(bytes: [u8; ROUTER_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an id from a slice, failing unless it is exactly 32 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; ROUTER_ID_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidRouterId(format!("expected {} bytes, got {}", ROUTER_ID_LEN, bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ROUTER_ID_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// XOR distance to another id, as a big-endian 256-bit integer
    pub fn xor_distance(&self, other: &RouterId) -> [u8; ROUTER_ID_LEN] {
        let mut out = [0u8; ROUTER_ID_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        out
    }

    /// Lowercase hex encoding (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidRouterId(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// The first hex digit of the id, which names its on-disk shard
    pub fn shard(&self) -> char {
        char::from(b"0123456789abcdef"[(self.0[0] >> 4) as usize])
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouterId({})", &self.to_hex()[..16])
    }
}

impl FromStr for RouterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; ROUTER_ID_LEN]> for RouterId {
    fn from(bytes: [u8; ROUTER_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for RouterId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
