//! Helpers behind the inspection subcommands

use anyhow::Context;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use veil_core::{RouterContact, RouterId};
use veil_nodedb::archive::CONTACT_FILE_EXT;
use veil_nodedb::loader::{classify, Verdict};
use veil_nodedb::NodeDb;

/// Contacts expiring within this window are flagged in listings
const EXPIRY_WARNING: Duration = Duration::from_secs(60 * 60);

pub fn parse_router_id(s: &str) -> anyhow::Result<RouterId> {
    s.trim()
        .parse()
        .with_context(|| format!("Invalid router id: {}", s))
}

/// Outcome of an import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: usize,
}

/// `path` itself if it is a file, otherwise every contact file directly
/// inside it
pub fn contact_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("Cannot read {}", path.display()))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == CONTACT_FILE_EXT))
        .collect();
    files.sort();
    Ok(files)
}

/// Validate each contact file under `path` and merge the good ones into `db`.
///
/// Source files are never modified.
pub fn import(db: &NodeDb, path: &Path, now: u64) -> anyhow::Result<ImportReport> {
    let mut report = ImportReport::default();

    for file in contact_files(path)? {
        match classify(RouterContact::read(&file), db.net_id(), now) {
            Verdict::Admit(rc) => {
                tracing::debug!("Importing {} from {}", rc.pubkey, file.display());
                db.put_if_newer(rc)?;
                report.imported += 1;
            }
            Verdict::Skip => {
                tracing::warn!("{} belongs to another network", file.display());
                report.rejected += 1;
            }
            Verdict::Purge => {
                tracing::warn!("{} is not a valid, current router contact", file.display());
                report.rejected += 1;
            }
        }
    }

    Ok(report)
}

/// Multi-line human readable summary of a contact
pub fn describe(rc: &RouterContact, now: u64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Router: {}", rc.pubkey);
    let _ = writeln!(out, "  Network: {}", rc.net_id);
    let _ = writeln!(out, "  Version: {}", rc.version);
    let _ = writeln!(out, "  Age: {}s", rc.age(now).as_secs());

    let status = if rc.is_expired(now) {
        "expired"
    } else if rc.expires_soon(now, EXPIRY_WARNING) {
        "expires soon"
    } else {
        "current"
    };
    let _ = writeln!(out, "  Status: {}", status);

    if rc.addrs.is_empty() {
        let _ = writeln!(out, "  No public addresses");
    }
    for addr in &rc.addrs {
        let _ = writeln!(
            out,
            "  Address: {} {}:{} (rank {})",
            addr.dialect, addr.ip, addr.port, addr.rank
        );
    }
    out
}

/// One line per contact, with its XOR distance to `target` as hex
pub fn distance_line(rc: &RouterContact, target: &RouterId) -> String {
    format!("{}  {}", rc.pubkey, hex::encode(rc.pubkey.xor_distance(target)))
}
