//! Veil NodeDB - the local router contact store
//!
//! This crate keeps every router contact the node knows about in memory,
//! mirrors them into a sharded on-disk archive, and answers the XOR-metric
//! nearest-router queries used by the DHT.

pub mod archive;
pub mod disk;
pub mod flush;
pub mod gate;
mod legacy;
pub mod loader;
mod nodedb;
pub mod routing;
pub mod table;

pub use archive::{ensure_archive, Archive};
pub use disk::{DiskIo, DiskJob, InlineDisk, ThreadDisk, TokioDisk};
pub use loader::LoadReport;
pub use nodedb::NodeDb;

use gate::GateError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use veil_core::NetId;

#[derive(Error, Debug)]
pub enum NodeDbError {
    #[error("Node database root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Node database has shut down")]
    Shutdown,

    #[error("Node database task panicked")]
    TaskPanicked,
}

impl From<GateError> for NodeDbError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Closed => NodeDbError::Shutdown,
            GateError::TaskPanicked => NodeDbError::TaskPanicked,
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeDbError>;

/// Node database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDbConfig {
    /// Archive directory; `None` keeps contacts in memory only
    pub root: Option<PathBuf>,
    /// Network whose contacts we accept from disk
    pub net_id: NetId,
    /// Periodically write the whole table to disk
    pub flush_enabled: bool,
    /// Seconds between flushes
    pub flush_interval_secs: u64,
    /// Milliseconds between owner-thread ticks
    pub tick_interval_ms: u64,
}

impl Default for NodeDbConfig {
    fn default() -> Self {
        Self {
            root: None,
            net_id: NetId::default(),
            flush_enabled: true,
            flush_interval_secs: flush::FLUSH_INTERVAL.as_secs(),
            tick_interval_ms: 1000,
        }
    }
}

impl NodeDbConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
