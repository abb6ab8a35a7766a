//! The node database handle

use crate::archive::{ensure_archive, Archive};
use crate::disk::{DiskIo, DiskJob};
use crate::flush::FlushSchedule;
use crate::gate::{Gate, Owned};
use crate::loader::{self, LoadReport};
use crate::table::NodeTable;
use crate::{NodeDbConfig, Result};
use rand::seq::IteratorRandom;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use veil_core::{Clock, NetId, RouterContact, RouterId};

/// Everything the owner thread holds exclusively
struct State {
    table: NodeTable,
    flush: FlushSchedule,
}

impl State {
    fn flush_job(&mut self, now: u64, archive: Option<&Archive>) -> Option<DiskJob> {
        if !self.flush.on_tick(now) {
            return None;
        }
        let archive = archive?;

        tracing::debug!("Flushing {} router contacts to disk", self.table.len());
        let contacts = self
            .table
            .contacts()
            .map(|rc| (archive.path_for(&rc.pubkey), rc.clone()))
            .collect();
        Some(DiskJob::WriteSnapshot(contacts))
    }
}

/// Where owner-thread tasks send archive work. Holds no reference to the
/// table, so it can be moved into tasks freely.
#[derive(Clone)]
struct DiskSink {
    archive: Option<Archive>,
    disk: Arc<dyn DiskIo>,
}

impl DiskSink {
    /// Delete the files of `ids`, if there is an archive and anything to delete
    fn remove(&self, ids: &[RouterId]) {
        let Some(archive) = &self.archive else {
            return;
        };
        let files: BTreeSet<_> = ids.iter().map(|id| archive.path_for(id)).collect();
        if !files.is_empty() {
            self.disk.run(DiskJob::RemoveFiles(files));
        }
    }

    /// Run the flush scheduler against the owned state
    fn tick(&self, owned: &Owned<State>, now: u64) {
        if let Some(job) = owned.with(|s| s.flush_job(now, self.archive.as_ref())) {
            self.disk.run(job);
        }
    }
}

/// Handle to the node database.
///
/// Cheap to clone; all clones talk to the same owner thread. Mutations are
/// queued and return immediately, queries block until the owner answers.
/// Every operation may also be called from the owner thread itself (for
/// example from a [`NodeDb::remove_if`] predicate).
#[derive(Clone)]
pub struct NodeDb {
    gate: Gate<State>,
    sink: DiskSink,
    net_id: NetId,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for NodeDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDb")
            .field("archive", &self.sink.archive)
            .field("net_id", &self.net_id)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl NodeDb {
    /// Prepare the archive (if configured) and start the owner thread.
    ///
    /// The table starts empty; call [`NodeDb::load_from_disk`] before
    /// serving lookups.
    pub fn open(config: &NodeDbConfig, disk: Arc<dyn DiskIo>, clock: Arc<dyn Clock>) -> Result<Self> {
        let archive = config.root.as_deref().map(ensure_archive).transpose()?;

        let flush = if config.flush_enabled {
            FlushSchedule::new(clock.now_ms(), config.flush_interval())
        } else {
            FlushSchedule::disabled()
        };
        let state = State {
            table: NodeTable::new(),
            flush,
        };

        let sink = DiskSink { archive, disk };

        let on_tick = {
            let sink = sink.clone();
            let clock = clock.clone();
            move |owned: &Owned<State>| sink.tick(owned, clock.now_ms())
        };
        let gate = Gate::spawn("nodedb", state, config.tick_interval(), on_tick)?;

        match &sink.archive {
            Some(archive) => tracing::info!("Node database at {}", archive.root().display()),
            None => tracing::info!("Node database running in memory only"),
        }

        Ok(Self {
            gate,
            sink,
            net_id: config.net_id.clone(),
            clock,
        })
    }

    pub fn archive(&self) -> Option<&Archive> {
        self.sink.archive.as_ref()
    }

    pub fn net_id(&self) -> &NetId {
        &self.net_id
    }

    /// Where the contact for `id` is stored, if there is an archive
    pub fn path_for(&self, id: &RouterId) -> Option<std::path::PathBuf> {
        self.archive().map(|a| a.path_for(id))
    }

    /// Load every valid contact from the archive into the table.
    ///
    /// The scan runs on the calling thread; invalid files are deleted.
    pub fn load_from_disk(&self) -> Result<LoadReport> {
        let Some(archive) = self.archive() else {
            return Ok(LoadReport::default());
        };

        let now = self.clock.now_ms();
        let (admitted, report) = loader::scan(archive, &self.net_id, now);

        self.gate.call_get(move |owned| {
            owned.with(|s| {
                for rc in admitted {
                    s.table.put_if_newer(rc, now);
                }
            })
        })?;

        tracing::info!(
            "Loaded {} router contacts ({} purged, {} from other networks)",
            report.loaded,
            report.purged,
            report.skipped
        );
        Ok(report)
    }

    /// Write every contact to disk now, on the calling thread.
    ///
    /// Returns how many files were written.
    pub fn save_to_disk(&self) -> Result<usize> {
        let Some(archive) = self.archive().cloned() else {
            return Ok(0);
        };

        let contacts = self.gate.call_get(|owned| owned.with(|s| s.table.snapshot()))?;
        let job = DiskJob::WriteSnapshot(
            contacts
                .into_iter()
                .map(|rc| (archive.path_for(&rc.pubkey), rc))
                .collect(),
        );
        Ok(job.execute())
    }

    /// Run the flush scheduler as of `now` (ms since epoch)
    pub fn tick(&self, now: u64) -> Result<()> {
        let sink = self.sink.clone();
        self.gate.call(move |owned| sink.tick(owned, now))?;
        Ok(())
    }

    /// Store `rc`, replacing whatever was there for its router
    pub fn put(&self, rc: RouterContact) -> Result<()> {
        let clock = self.clock.clone();
        self.gate.call(move |owned| {
            let now = clock.now_ms();
            owned.with(|s| s.table.put(rc, now));
        })?;
        Ok(())
    }

    /// Store `rc` unless we already hold a contact for its router that is
    /// at least as fresh
    pub fn put_if_newer(&self, rc: RouterContact) -> Result<()> {
        let clock = self.clock.clone();
        self.gate.call(move |owned| {
            let now = clock.now_ms();
            let id = rc.pubkey;
            if !owned.with(|s| s.table.put_if_newer(rc, now)) {
                tracing::trace!("Ignoring stale contact for {}", id);
            }
        })?;
        Ok(())
    }

    /// Forget a router and delete its file. Unknown routers are fine.
    pub fn remove(&self, id: RouterId) -> Result<()> {
        let sink = self.sink.clone();
        self.gate.call(move |owned| {
            owned.with(|s| s.table.remove(&id));
            sink.remove(&[id]);
        })?;
        Ok(())
    }

    /// Forget every router inserted before `cutoff` (ms since epoch) that
    /// is not listed in `keep`
    pub fn prune_stale(&self, keep: HashSet<RouterId>, cutoff: u64) -> Result<()> {
        let sink = self.sink.clone();
        self.gate.call(move |owned| {
            let removed = owned.with(|s| s.table.prune_stale(&keep, cutoff));
            if !removed.is_empty() {
                tracing::debug!("Pruned {} stale router contacts", removed.len());
                sink.remove(&removed);
            }
        })?;
        Ok(())
    }

    /// Forget every router whose contact matches `predicate`, returning
    /// how many were removed.
    ///
    /// The predicate runs on the owner thread.
    pub fn remove_if<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&RouterContact) -> bool + Send + 'static,
    {
        let sink = self.sink.clone();
        let removed = self.gate.call_get(move |owned| {
            let contacts = owned.with(|s| s.table.snapshot());
            let doomed: Vec<RouterId> = contacts
                .iter()
                .filter(|rc| predicate(*rc))
                .map(|rc| rc.pubkey)
                .collect();

            let removed = owned.with(|s| s.table.remove_many(&doomed));
            sink.remove(&removed);
            removed.len()
        })?;
        Ok(removed)
    }

    pub fn contains(&self, id: RouterId) -> Result<bool> {
        Ok(self
            .gate
            .call_get(move |owned| owned.with(|s| s.table.contains(&id)))?)
    }

    pub fn get(&self, id: RouterId) -> Result<Option<RouterContact>> {
        Ok(self
            .gate
            .call_get(move |owned| owned.with(|s| s.table.get(&id).map(|e| e.rc.clone())))?)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.gate.call_get(|owned| owned.with(|s| s.table.len()))?)
    }

    /// Owned copies of every stored contact
    pub fn all_contacts(&self) -> Result<Vec<RouterContact>> {
        Ok(self.gate.call_get(|owned| owned.with(|s| s.table.snapshot()))?)
    }

    /// The stored contact closest to `target` by XOR distance, `None` if
    /// the table is empty
    pub fn closest_to(&self, target: RouterId) -> Result<Option<RouterContact>> {
        Ok(self
            .gate
            .call_get(move |owned| owned.with(|s| s.table.closest_to(&target)))?)
    }

    /// Up to `k` stored contacts, closest to `target` first
    pub fn k_closest_to(&self, target: RouterId, k: usize) -> Result<Vec<RouterContact>> {
        Ok(self
            .gate
            .call_get(move |owned| owned.with(|s| s.table.k_closest_to(&target, k)))?)
    }

    /// A uniformly random contact among those accepted by `filter`.
    ///
    /// The filter runs on the owner thread.
    pub fn get_random<F>(&self, filter: F) -> Result<Option<RouterContact>>
    where
        F: Fn(&RouterContact) -> bool + Send + 'static,
    {
        Ok(self.gate.call_get(move |owned| {
            let contacts = owned.with(|s| s.table.snapshot());
            contacts
                .into_iter()
                .filter(|rc| filter(rc))
                .choose(&mut rand::thread_rng())
        })?)
    }

    /// Stop the owner thread after queued operations have run.
    ///
    /// Call [`NodeDb::save_to_disk`] first to persist the table.
    pub fn shutdown(&self) {
        self.gate.shutdown();
    }
}
