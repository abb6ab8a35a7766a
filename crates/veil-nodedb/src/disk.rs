//! Background disk I/O
//!
//! The owner thread never touches the archive directly. It packages the work
//! as a [`DiskJob`] carrying owned copies of everything needed and hands it
//! to a [`DiskIo`] runner. Jobs are fire-and-forget: failures are logged and
//! the in-memory table stays authoritative.

use std::collections::BTreeSet;
use std::path::PathBuf;
use veil_core::RouterContact;

/// A self-contained unit of archive work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskJob {
    /// Write each contact to its path
    WriteSnapshot(Vec<(PathBuf, RouterContact)>),
    /// Delete each file; missing files are not an error
    RemoveFiles(BTreeSet<PathBuf>),
}

impl DiskJob {
    /// Run the job on the current thread.
    ///
    /// Returns the number of files successfully written or removed.
    pub fn execute(self) -> usize {
        match self {
            DiskJob::WriteSnapshot(contacts) => {
                let total = contacts.len();
                let mut written = 0;
                for (path, rc) in contacts {
                    match rc.write(&path) {
                        Ok(()) => written += 1,
                        Err(e) => {
                            tracing::warn!("Failed to write {}: {}", path.display(), e);
                        }
                    }
                }
                tracing::debug!("Wrote {}/{} router contacts", written, total);
                written
            }
            DiskJob::RemoveFiles(paths) => {
                let mut removed = 0;
                for path in paths {
                    match std::fs::remove_file(&path) {
                        Ok(()) => removed += 1,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => {
                            tracing::warn!("Failed to remove {}: {}", path.display(), e);
                        }
                    }
                }
                tracing::debug!("Removed {} router contact files", removed);
                removed
            }
        }
    }
}

/// Runs disk jobs away from the caller.
///
/// Implementations must not assume jobs complete in submission order.
pub trait DiskIo: Send + Sync {
    fn run(&self, job: DiskJob);
}

/// Runs each job on Tokio's blocking thread pool
#[derive(Debug, Clone)]
pub struct TokioDisk {
    handle: tokio::runtime::Handle,
}

impl TokioDisk {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running in.
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl DiskIo for TokioDisk {
    fn run(&self, job: DiskJob) {
        self.handle.spawn_blocking(move || job.execute());
    }
}

/// Runs each job on a freshly spawned thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDisk;

impl DiskIo for ThreadDisk {
    fn run(&self, job: DiskJob) {
        let spawned = std::thread::Builder::new()
            .name("nodedb-disk".to_string())
            .spawn(move || job.execute());
        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn disk worker: {}", e);
        }
    }
}

/// Runs each job immediately on the submitting thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDisk;

impl DiskIo for InlineDisk {
    fn run(&self, job: DiskJob) {
        job.execute();
    }
}
