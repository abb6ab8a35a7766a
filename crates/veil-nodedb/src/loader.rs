//! Startup scan of the contact archive

use crate::archive::{Archive, CONTACT_FILE_EXT};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use veil_core::contact::TEMP_FILE_SUFFIX;
use veil_core::{NetId, RouterContact};

/// Outcome of a disk load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Contacts admitted to the table
    pub loaded: usize,
    /// Undecodable, expired or badly signed files deleted from disk
    pub purged: usize,
    /// Files from another network, left in place
    pub skipped: usize,
}

/// What to do with one archive file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Admit(RouterContact),
    Purge,
    Skip,
}

/// Run the validation pipeline over one decoded file
pub fn classify(decoded: veil_core::Result<RouterContact>, net_id: &NetId, now: u64) -> Verdict {
    let rc = match decoded {
        Ok(rc) => rc,
        Err(_) => return Verdict::Purge,
    };

    if !rc.is_from_network(net_id) {
        return Verdict::Skip;
    }
    if rc.is_expired(now) {
        return Verdict::Purge;
    }
    if !rc.verify_signature() {
        return Verdict::Purge;
    }
    Verdict::Admit(rc)
}

fn is_contact_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == CONTACT_FILE_EXT)
}

/// Scratch file left behind by a write that never completed
fn is_abandoned_write(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().ends_with(TEMP_FILE_SUFFIX))
}

/// Scan every shard, returning the admissible contacts.
///
/// Files that fail validation, and scratch files of interrupted writes,
/// are deleted before returning. Only scan while nothing else writes to
/// the archive.
pub fn scan(archive: &Archive, net_id: &NetId, now: u64) -> (Vec<RouterContact>, LoadReport) {
    let mut admitted = Vec::new();
    let mut purge: BTreeSet<PathBuf> = BTreeSet::new();
    let mut report = LoadReport::default();

    for shard in archive.shard_dirs() {
        let entries = match std::fs::read_dir(&shard) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot read shard {}: {}", shard.display(), e);
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if is_abandoned_write(&path) {
                tracing::debug!("Removing interrupted write {}", path.display());
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!("Failed to remove {}: {}", path.display(), e);
                }
                continue;
            }
            if !is_contact_file(&path) {
                continue;
            }

            match classify(RouterContact::read(&path), net_id, now) {
                Verdict::Admit(rc) => {
                    tracing::trace!("Loaded {}", rc.pubkey);
                    admitted.push(rc);
                }
                Verdict::Purge => {
                    tracing::debug!("Purging invalid contact {}", path.display());
                    purge.insert(path);
                }
                Verdict::Skip => {
                    tracing::trace!("Skipping foreign network contact {}", path.display());
                    report.skipped += 1;
                }
            }
        }
    }

    if !purge.is_empty() {
        tracing::warn!("Removing {} invalid router contacts from disk", purge.len());
        for path in &purge {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    report.loaded = admitted.len();
    report.purged = purge.len();
    (admitted, report)
}
