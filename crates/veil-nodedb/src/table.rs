//! In-memory router contact table

use crate::routing;
use std::collections::{HashMap, HashSet};
use veil_core::{RouterContact, RouterId};

/// A stored contact and when this process inserted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub rc: RouterContact,
    /// Milliseconds since the Unix epoch, local to this process
    pub inserted_at: u64,
}

/// Router id to contact mapping
///
/// Not thread safe by itself: after startup it is only ever touched from
/// the node database's owner thread.
#[derive(Debug, Default)]
pub struct NodeTable {
    entries: HashMap<RouterId, Entry>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the contact for its router
    pub fn put(&mut self, rc: RouterContact, now: u64) {
        self.entries.insert(
            rc.pubkey,
            Entry {
                rc,
                inserted_at: now,
            },
        );
    }

    /// Insert the contact unless the stored one is at least as fresh.
    ///
    /// Returns true if the table changed.
    pub fn put_if_newer(&mut self, rc: RouterContact, now: u64) -> bool {
        if let Some(existing) = self.entries.get(&rc.pubkey) {
            if !existing.rc.other_is_newer(&rc) {
                return false;
            }
        }
        self.put(rc, now);
        true
    }

    pub fn remove(&mut self, id: &RouterId) -> Option<Entry> {
        self.entries.remove(id)
    }

    /// Remove entries inserted strictly before `cutoff` that are not in
    /// `keep`, returning the removed ids
    pub fn prune_stale(&mut self, keep: &HashSet<RouterId>, cutoff: u64) -> Vec<RouterId> {
        let mut removed = Vec::new();
        self.entries.retain(|id, entry| {
            if entry.inserted_at < cutoff && !keep.contains(id) {
                removed.push(*id);
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn remove_many(&mut self, ids: &[RouterId]) -> Vec<RouterId> {
        ids.iter()
            .filter(|id| self.entries.remove(*id).is_some())
            .copied()
            .collect()
    }

    pub fn get(&self, id: &RouterId) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &RouterId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &RouterContact> {
        self.entries.values().map(|e| &e.rc)
    }

    /// Owned copies of every stored contact
    pub fn snapshot(&self) -> Vec<RouterContact> {
        self.contacts().cloned().collect()
    }

    pub fn closest_to(&self, target: &RouterId) -> Option<RouterContact> {
        routing::closest(self.contacts(), target).cloned()
    }

    pub fn k_closest_to(&self, target: &RouterId, k: usize) -> Vec<RouterContact> {
        routing::k_closest(self.contacts(), target, k)
            .into_iter()
            .cloned()
            .collect()
    }
}
