//! On-disk contact archive layout
//!
//! Contacts live under `<root>/<shard>/<hex id>.signed`, where the shard is
//! the first hex digit of the router id, giving 16 subdirectories.

use crate::{legacy, NodeDbError, Result};
use std::path::{Path, PathBuf};
use veil_core::RouterId;

/// Extension of router contact files
pub const CONTACT_FILE_EXT: &str = "signed";

/// Names of the 16 shard subdirectories
pub const SHARDS: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// An initialized archive root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding the contact for `id`
    pub fn path_for(&self, id: &RouterId) -> PathBuf {
        self.shard_dir(id.shard())
            .join(format!("{}.{}", id.to_hex(), CONTACT_FILE_EXT))
    }

    pub fn shard_dir(&self, shard: char) -> PathBuf {
        self.root.join(shard.to_string())
    }

    pub fn shard_dirs(&self) -> impl Iterator<Item = PathBuf> + '_ {
        SHARDS.iter().map(move |s| self.shard_dir(*s))
    }
}

/// Make sure `root` exists as a directory with all 16 shards under it.
///
/// A missing root is migrated from a legacy `netdb` sibling when one exists,
/// otherwise created. Fails if `root` exists but is not a directory.
pub fn ensure_archive(root: &Path) -> Result<Archive> {
    if !root.exists() {
        if !legacy::migrate(root)? {
            std::fs::create_dir_all(root)?;
            tracing::info!("Created node database at {}", root.display());
        }
    }

    if !root.is_dir() {
        return Err(NodeDbError::NotADirectory(root.to_path_buf()));
    }

    let archive = Archive {
        root: root.to_path_buf(),
    };

    for dir in archive.shard_dirs() {
        match std::fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(archive)
}
