//! Router contacts
//!
//! A [`RouterContact`] is the signed descriptor a relay publishes about
//! itself: its identity key, where it can be reached, which network it
//! belongs to and when it was last refreshed. Contacts are immutable once
//! signed; a relay that changes anything publishes a whole new contact.

use crate::proto::{decode_contact, encode_contact};
use crate::{Result, RouterId, DEFAULT_NET_ID, PROTOCOL_VERSION};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Suffix of the scratch files a write goes through before being renamed
/// into place
pub const TEMP_FILE_SUFFIX: &str = ".signed.tmp";

/// How long a contact stays valid after `last_updated`
pub const LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Network tag separating independent deployments
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetId(String);

impl NetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NetId {
    fn default() -> Self {
        Self(DEFAULT_NET_ID.to_string())
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetId({})", self.0)
    }
}

impl From<&str> for NetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One reachable endpoint of a router
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressInfo {
    /// Preference among the router's addresses (lower is preferred)
    pub rank: u16,
    /// Link-layer protocol spoken on this endpoint
    pub dialect: String,
    pub ip: IpAddr,
    pub port: u16,
}

impl AddressInfo {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            rank: 1,
            dialect: "quic".to_string(),
            ip,
            port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterContact {
    pub pubkey: RouterId,
    pub addrs: Vec<AddressInfo>,
    pub net_id: NetId,
    pub version: u32,
    /// Milliseconds since the Unix epoch
    pub last_updated: u64,
    /// Ed25519 signature (empty = unsigned)
    pub signature: Vec<u8>,
}

impl RouterContact {
    /// Create an unsigned contact. Call [`RouterContact::sign`] before
    /// handing it to anyone.
    pub fn new(addrs: Vec<AddressInfo>, net_id: NetId, last_updated: u64) -> Self {
        Self {
            pubkey: RouterId::default(),
            addrs,
            net_id,
            version: PROTOCOL_VERSION,
            last_updated,
            signature: Vec::new(),
        }
    }

    /// Bytes covered by the signature: the encoding with an empty signature
    fn signed_payload(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signature.clear();
        encode_contact(&unsigned)
    }

    /// Bind this contact to `key`: sets the identity and signs the result
    pub fn sign(&mut self, key: &SigningKey) {
        self.pubkey = RouterId::from_bytes(key.verifying_key().to_bytes());
        let signature = key.sign(&self.signed_payload());
        self.signature = signature.to_bytes().to_vec();
    }

    /// Check the signature against the embedded identity key
    pub fn verify(&self) -> Result<()> {
        let key = VerifyingKey::from_bytes(self.pubkey.as_bytes())?;
        let signature = Signature::from_slice(&self.signature)?;
        key.verify_strict(&self.signed_payload(), &signature)?;
        Ok(())
    }

    pub fn verify_signature(&self) -> bool {
        self.verify().is_ok()
    }

    pub fn expires_at(&self) -> u64 {
        self.last_updated.saturating_add(LIFETIME.as_millis() as u64)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at()
    }

    /// True if the contact expires within `delta` of `now_ms`
    pub fn expires_soon(&self, now_ms: u64, delta: Duration) -> bool {
        now_ms.saturating_add(delta.as_millis() as u64) >= self.expires_at()
    }

    /// Time since the last update, zero if `last_updated` is in the future
    pub fn age(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.last_updated))
    }

    pub fn is_from_network(&self, net_id: &NetId) -> bool {
        &self.net_id == net_id
    }

    /// Freshness rule: is `other` a newer version of this router's contact?
    pub fn other_is_newer(&self, other: &RouterContact) -> bool {
        self.last_updated < other.last_updated
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_contact(self)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        decode_contact(buf)
    }

    /// Read a contact from a file. The signature is not checked.
    pub fn read(path: &Path) -> Result<Self> {
        let buf = std::fs::read(path)?;
        Self::decode(&buf)
    }

    /// Write the contact to `path`, replacing any previous file atomically.
    ///
    /// Each call goes through its own scratch file next to `path`, so
    /// concurrent writers of the same contact never interleave.
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(TEMP_FILE_SUFFIX)
            .tempfile_in(dir)?;
        tmp.write_all(&self.encode())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
