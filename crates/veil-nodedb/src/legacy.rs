//! Compatibility with the pre-shard `netdb` directory name.
//!
//! Only [`crate::archive::ensure_archive`] calls into this module.

use crate::Result;
use std::path::{Path, PathBuf};

/// Directory name used by older releases, as a sibling of the archive root
pub const LEGACY_DIR_NAME: &str = "netdb";

fn legacy_dir(root: &Path) -> Option<PathBuf> {
    root.parent().map(|parent| parent.join(LEGACY_DIR_NAME))
}

/// Move a legacy archive into place at `root`.
///
/// Returns `false` when there is nothing to migrate.
pub(crate) fn migrate(root: &Path) -> Result<bool> {
    let Some(old) = legacy_dir(root) else {
        return Ok(false);
    };
    if old == root || !old.exists() {
        return Ok(false);
    }

    std::fs::rename(&old, root)?;
    tracing::info!(
        "Migrated legacy node database {} to {}",
        old.display(),
        root.display()
    );
    Ok(true)
}
