//! Protocol buffer message definitions for router contacts
//!
//! These are manually defined to match the veil.proto schema,
//! avoiding the need for protoc at build time.

use crate::contact::{AddressInfo, NetId, RouterContact};
use crate::{Error, Result, RouterId};
use prost::Message;
use std::net::IpAddr;

/// Signed router contact as stored on disk and gossiped between routers
#[derive(Clone, PartialEq, Message)]
pub struct ProtoRouterContact {
    /// Ed25519 identity key (32 bytes)
    #[prost(bytes, tag = "1")]
    pub pubkey: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub addrs: Vec<ProtoAddressInfo>,
    #[prost(string, tag = "3")]
    pub net_id: String,
    #[prost(uint32, tag = "4")]
    pub version: u32,
    /// Milliseconds since the Unix epoch
    #[prost(uint64, tag = "5")]
    pub last_updated: u64,
    /// Ed25519 signature over this message with the field left empty
    #[prost(bytes, tag = "6")]
    pub signature: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoAddressInfo {
    #[prost(uint32, tag = "1")]
    pub rank: u32,
    #[prost(string, tag = "2")]
    pub dialect: String,
    #[prost(string, tag = "3")]
    pub ip: String,
    #[prost(uint32, tag = "4")]
    pub port: u32,
}

impl From<&AddressInfo> for ProtoAddressInfo {
    fn from(addr: &AddressInfo) -> Self {
        Self {
            rank: addr.rank as u32,
            dialect: addr.dialect.clone(),
            ip: addr.ip.to_string(),
            port: addr.port as u32,
        }
    }
}

impl TryFrom<ProtoAddressInfo> for AddressInfo {
    type Error = Error;

    fn try_from(proto: ProtoAddressInfo) -> Result<Self> {
        let ip: IpAddr = proto
            .ip
            .parse()
            .map_err(|_| Error::InvalidData(format!("bad address ip: {:?}", proto.ip)))?;
        let port = u16::try_from(proto.port)
            .map_err(|_| Error::InvalidData(format!("port out of range: {}", proto.port)))?;
        let rank = u16::try_from(proto.rank)
            .map_err(|_| Error::InvalidData(format!("rank out of range: {}", proto.rank)))?;

        Ok(Self {
            rank,
            dialect: proto.dialect,
            ip,
            port,
        })
    }
}

impl From<&RouterContact> for ProtoRouterContact {
    fn from(rc: &RouterContact) -> Self {
        Self {
            pubkey: rc.pubkey.as_bytes().to_vec(),
            addrs: rc.addrs.iter().map(ProtoAddressInfo::from).collect(),
            net_id: rc.net_id.as_str().to_string(),
            version: rc.version,
            last_updated: rc.last_updated,
            signature: rc.signature.clone(),
        }
    }
}

impl TryFrom<ProtoRouterContact> for RouterContact {
    type Error = Error;

    fn try_from(proto: ProtoRouterContact) -> Result<Self> {
        let pubkey = RouterId::from_slice(&proto.pubkey)?;
        let addrs = proto
            .addrs
            .into_iter()
            .map(AddressInfo::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pubkey,
            addrs,
            net_id: NetId::new(proto.net_id),
            version: proto.version,
            last_updated: proto.last_updated,
            signature: proto.signature,
        })
    }
}

/// Encode a router contact to bytes
pub fn encode_contact(rc: &RouterContact) -> Vec<u8> {
    ProtoRouterContact::from(rc).encode_to_vec()
}

/// Decode a router contact from bytes. Does not check the signature.
pub fn decode_contact(buf: &[u8]) -> Result<RouterContact> {
    let proto = ProtoRouterContact::decode(buf)?;
    RouterContact::try_from(proto)
}
