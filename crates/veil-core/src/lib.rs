//! Veil Core - Shared types for the Veil overlay
//!
//! This crate provides the router contact model (the signed, expiring
//! descriptor every relay publishes about itself), router identifiers and
//! their on-disk/wire encoding, plus the clock abstraction used by the
//! node database.

pub mod contact;
pub mod error;
pub mod proto;
pub mod router_id;
pub mod time;

pub use contact::{AddressInfo, NetId, RouterContact};
pub use error::{Error, Result};
pub use router_id::RouterId;
pub use time::{Clock, ManualClock, SystemClock};

/// Router contact format version written by this crate
pub const PROTOCOL_VERSION: u32 = 1;

/// Network tag used when none is configured
pub const DEFAULT_NET_ID: &str = "veil";
