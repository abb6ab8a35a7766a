//! Integration tests for the node database
//!
//! These drive `NodeDb` through its public handle with a manual clock and
//! a recording disk runner, so every background job can be inspected.

use ed25519_dalek::SigningKey;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use veil_core::{AddressInfo, ManualClock, NetId, RouterContact, RouterId};
use veil_nodedb::{DiskIo, DiskJob, InlineDisk, LoadReport, NodeDb, NodeDbConfig, NodeDbError};

const NOW: u64 = 1_700_000_000_000;
const MIN5: u64 = 5 * 60 * 1000;

#[derive(Default)]
struct RecordingDisk {
    jobs: Mutex<Vec<DiskJob>>,
}

impl RecordingDisk {
    fn jobs(&self) -> Vec<DiskJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl DiskIo for RecordingDisk {
    fn run(&self, job: DiskJob) {
        self.jobs.lock().unwrap().push(job);
    }
}

fn signed(seed: u8, last_updated: u64) -> RouterContact {
    signed_on(seed, "veil", last_updated)
}

fn signed_on(seed: u8, net: &str, last_updated: u64) -> RouterContact {
    let mut rc = RouterContact::new(
        vec![AddressInfo::new(IpAddr::V4(Ipv4Addr::new(10, 1, 0, seed)), 1090)],
        NetId::from(net),
        last_updated,
    );
    rc.sign(&SigningKey::from_bytes(&[seed; 32]));
    rc
}

/// An unsigned contact with a chosen id, for lookups that never touch disk
fn with_id(bytes: [u8; 32]) -> RouterContact {
    let mut rc = RouterContact::new(vec![], NetId::default(), NOW);
    rc.pubkey = RouterId::from_bytes(bytes);
    rc
}

fn id_with_tail(tail: u8) -> RouterId {
    let mut bytes = [0u8; 32];
    bytes[31] = tail;
    RouterId::from_bytes(bytes)
}

fn quiet_config(root: Option<&std::path::Path>) -> NodeDbConfig {
    NodeDbConfig {
        root: root.map(|r| r.to_path_buf()),
        // Keep the owner loop's own ticks out of the way
        tick_interval_ms: 3_600_000,
        ..NodeDbConfig::default()
    }
}

struct Fixture {
    _temp: TempDir,
    db: NodeDb,
    disk: Arc<RecordingDisk>,
    clock: ManualClock,
}

fn fixture() -> Fixture {
    fixture_with(|_| {})
}

fn fixture_with(tweak: impl FnOnce(&mut NodeDbConfig)) -> Fixture {
    let temp = TempDir::new().unwrap();
    let mut config = quiet_config(Some(&temp.path().join("nodedb")));
    tweak(&mut config);

    let disk = Arc::new(RecordingDisk::default());
    let clock = ManualClock::new(NOW);
    let db = NodeDb::open(&config, disk.clone(), Arc::new(clock.clone())).unwrap();

    Fixture {
        _temp: temp,
        db,
        disk,
        clock,
    }
}

#[test]
fn test_disk_round_trip() {
    let f = fixture();
    let rc = signed(1, NOW);
    rc.write(&f.db.path_for(&rc.pubkey).unwrap()).unwrap();

    let report = f.db.load_from_disk().unwrap();

    assert_eq!(report.loaded, 1);
    assert_eq!(f.db.count().unwrap(), 1);
    assert_eq!(f.db.get(rc.pubkey).unwrap(), Some(rc));
}

#[test]
fn test_load_purges_forged_and_skips_foreign() {
    let f = fixture();

    let mut forged = signed(2, NOW);
    forged.signature[10] ^= 0xff;
    let forged_path = f.db.path_for(&forged.pubkey).unwrap();
    forged.write(&forged_path).unwrap();

    let foreign = signed_on(3, "testnet", NOW);
    let foreign_path = f.db.path_for(&foreign.pubkey).unwrap();
    foreign.write(&foreign_path).unwrap();

    let expired = signed(4, NOW - 25 * 60 * 60 * 1000);
    let expired_path = f.db.path_for(&expired.pubkey).unwrap();
    expired.write(&expired_path).unwrap();

    let report = f.db.load_from_disk().unwrap();

    assert_eq!(
        report,
        LoadReport {
            loaded: 0,
            purged: 2,
            skipped: 1
        }
    );
    assert!(!forged_path.exists());
    assert!(!expired_path.exists());
    assert!(foreign_path.exists());
    assert!(!f.db.contains(forged.pubkey).unwrap());
    assert!(!f.db.contains(foreign.pubkey).unwrap());
    assert_eq!(f.db.count().unwrap(), 0);
}

#[test]
fn test_put_if_newer_keeps_freshest() {
    let f = fixture();
    let a = signed(5, NOW);
    let b = signed(5, NOW + 1_000);

    f.db.put(a.clone()).unwrap();
    f.db.put_if_newer(b.clone()).unwrap();
    assert_eq!(f.db.get(b.pubkey).unwrap(), Some(b.clone()));

    let f = fixture();
    f.db.put(b.clone()).unwrap();
    f.db.put_if_newer(a).unwrap();
    assert_eq!(f.db.get(b.pubkey).unwrap(), Some(b));
}

#[test]
fn test_put_overwrites_unconditionally() {
    let f = fixture();
    let old = signed(6, NOW);
    let new = signed(6, NOW + 1_000);

    f.db.put(new).unwrap();
    f.db.put(old.clone()).unwrap();

    assert_eq!(f.db.get(old.pubkey).unwrap(), Some(old));
    assert_eq!(f.db.count().unwrap(), 1);
}

#[test]
fn test_prune_stale_respects_cutoff_and_keep_set() {
    let f = fixture();
    let early_a = signed(7, NOW);
    let early_b = signed(8, NOW);
    let late = signed(9, NOW);

    f.clock.set(NOW);
    f.db.put(early_a.clone()).unwrap();
    f.db.put(early_b.clone()).unwrap();
    // Make sure both puts ran before the clock moves
    f.db.count().unwrap();
    f.clock.set(NOW + 2_000);
    f.db.put(late.clone()).unwrap();

    let keep: HashSet<_> = [early_b.pubkey].into_iter().collect();
    f.db.prune_stale(keep, NOW + 1_000).unwrap();

    assert!(!f.db.contains(early_a.pubkey).unwrap());
    assert!(f.db.contains(early_b.pubkey).unwrap());
    assert!(f.db.contains(late.pubkey).unwrap());

    let expected = DiskJob::RemoveFiles([f.db.path_for(&early_a.pubkey).unwrap()].into_iter().collect());
    assert_eq!(f.disk.jobs(), vec![expected]);

    // Nothing left to prune: no job
    f.db.prune_stale(HashSet::new(), NOW + 1_000).unwrap();
    f.db.count().unwrap();
    assert_eq!(f.disk.jobs().len(), 1);
}

#[test]
fn test_closest_queries() {
    let f = fixture();
    assert_eq!(f.db.closest_to(id_with_tail(0)).unwrap(), None);
    assert!(f.db.k_closest_to(id_with_tail(0), 3).unwrap().is_empty());

    for tail in [0b0001, 0b0010, 0b1111] {
        let mut bytes = [0u8; 32];
        bytes[31] = tail;
        f.db.put(with_id(bytes)).unwrap();
    }

    let best = f.db.closest_to(id_with_tail(0b0000)).unwrap().unwrap();
    assert_eq!(best.pubkey, id_with_tail(0b0001));

    let two: Vec<_> = f
        .db
        .k_closest_to(id_with_tail(0b0000), 2)
        .unwrap()
        .into_iter()
        .map(|rc| rc.pubkey)
        .collect();
    assert_eq!(two, vec![id_with_tail(0b0001), id_with_tail(0b0010)]);

    assert_eq!(f.db.k_closest_to(id_with_tail(0), 10).unwrap().len(), 3);
}

#[test]
fn test_remove_is_idempotent() {
    let f = fixture();
    let rc = signed(10, NOW);
    f.db.put(rc.clone()).unwrap();

    f.db.remove(rc.pubkey).unwrap();
    f.db.remove(rc.pubkey).unwrap();
    f.db.remove(id_with_tail(42)).unwrap();

    assert!(!f.db.contains(rc.pubkey).unwrap());
    assert_eq!(f.db.count().unwrap(), 0);

    // File deletion is requested every time, present in memory or not
    let jobs = f.disk.jobs();
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|job| matches!(job, DiskJob::RemoveFiles(files) if files.len() == 1)));
}

#[test]
fn test_flush_disabled_never_writes() {
    let f = fixture_with(|c| c.flush_enabled = false);
    f.db.put(signed(11, NOW)).unwrap();

    for i in 0..10 {
        f.db.tick(NOW + i * MIN5 * 3).unwrap();
    }

    f.db.count().unwrap();
    assert!(f.disk.jobs().is_empty());
}

#[test]
fn test_flush_once_per_interval() {
    let f = fixture();
    let a = signed(12, NOW);
    let b = signed(13, NOW);
    f.db.put(a.clone()).unwrap();
    f.db.put(b.clone()).unwrap();
    f.db.remove(id_with_tail(1)).unwrap();

    f.db.tick(NOW + MIN5).unwrap();
    f.db.tick(NOW + MIN5 + 1).unwrap();
    f.db.tick(NOW + MIN5 + 2).unwrap();
    f.db.count().unwrap();

    let writes: Vec<_> = f
        .disk
        .jobs()
        .into_iter()
        .filter(|job| matches!(job, DiskJob::WriteSnapshot(_)))
        .collect();
    assert_eq!(writes.len(), 1);
    match &writes[0] {
        DiskJob::WriteSnapshot(contacts) => {
            let mut ids: Vec<_> = contacts.iter().map(|(_, rc)| rc.pubkey).collect();
            ids.sort();
            let mut expected = vec![a.pubkey, b.pubkey];
            expected.sort();
            assert_eq!(ids, expected);
            for (path, rc) in contacts {
                assert_eq!(Some(path.clone()), f.db.path_for(&rc.pubkey));
            }
        }
        other => panic!("Expected WriteSnapshot, got {:?}", other),
    }

    f.db.tick(NOW + 2 * MIN5 + 1).unwrap();
    f.db.count().unwrap();
    let writes = f
        .disk
        .jobs()
        .iter()
        .filter(|job| matches!(job, DiskJob::WriteSnapshot(_)))
        .count();
    assert_eq!(writes, 2);
}

fn write_count(disk: &RecordingDisk) -> usize {
    disk.jobs()
        .iter()
        .filter(|job| matches!(job, DiskJob::WriteSnapshot(_)))
        .count()
}

#[test]
fn test_owner_loop_flushes_on_its_own() {
    let f = fixture_with(|c| c.tick_interval_ms = 5);
    let rc = signed(14, NOW);
    f.db.put(rc.clone()).unwrap();
    f.db.count().unwrap();

    // Ticking before the deadline writes nothing
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(write_count(&f.disk), 0);

    f.clock.advance(MIN5 + 1);
    for _ in 0..200 {
        if write_count(&f.disk) > 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(write_count(&f.disk), 1);

    // Later ticks within the same interval do not write again
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(write_count(&f.disk), 1);

    match &f.disk.jobs()[0] {
        DiskJob::WriteSnapshot(contacts) => {
            assert_eq!(contacts.len(), 1);
            assert_eq!(contacts[0].1, rc);
        }
        other => panic!("Expected WriteSnapshot, got {:?}", other),
    }
}

#[test]
fn test_save_and_reload() {
    let temp = TempDir::new().unwrap();
    let config = quiet_config(Some(&temp.path().join("nodedb")));
    let clock = Arc::new(ManualClock::new(NOW));

    let db = NodeDb::open(&config, Arc::new(InlineDisk), clock.clone()).unwrap();
    for seed in 20..30 {
        db.put(signed(seed, NOW)).unwrap();
    }
    assert_eq!(db.save_to_disk().unwrap(), 10);
    db.shutdown();

    let reopened = NodeDb::open(&config, Arc::new(InlineDisk), clock).unwrap();
    let report = reopened.load_from_disk().unwrap();
    assert_eq!(report.loaded, 10);
    assert_eq!(reopened.count().unwrap(), 10);
    assert!(reopened.contains(signed(25, NOW).pubkey).unwrap());
}

#[test]
fn test_remove_deletes_file() {
    let temp = TempDir::new().unwrap();
    let config = quiet_config(Some(&temp.path().join("nodedb")));
    let db = NodeDb::open(&config, Arc::new(InlineDisk), Arc::new(ManualClock::new(NOW))).unwrap();

    let rc = signed(31, NOW);
    db.put(rc.clone()).unwrap();
    db.save_to_disk().unwrap();
    let path = db.path_for(&rc.pubkey).unwrap();
    assert!(path.exists());

    db.remove(rc.pubkey).unwrap();
    db.count().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_remove_if_can_call_back_into_nodedb() {
    let f = fixture();
    for seed in 40..46 {
        f.db.put(signed(seed, NOW + seed as u64)).unwrap();
    }

    let inner = f.db.clone();
    let removed = f
        .db
        .remove_if(move |rc| {
            // Runs on the owner thread; must not deadlock
            let total = inner.count().unwrap();
            total == 6 && rc.last_updated % 2 == 0
        })
        .unwrap();

    assert_eq!(removed, 3);
    assert_eq!(f.db.count().unwrap(), 3);
    assert!(f
        .db
        .all_contacts()
        .unwrap()
        .iter()
        .all(|rc| rc.last_updated % 2 == 1));
}

#[test]
fn test_panicking_closure_leaves_nodedb_usable() {
    let f = fixture();
    let rc = signed(80, NOW);
    f.db.put(rc.clone()).unwrap();

    let removed = f.db.remove_if(|_| panic!("bad predicate"));
    assert!(matches!(removed, Err(NodeDbError::TaskPanicked)));
    let picked = f.db.get_random(|_| panic!("bad filter"));
    assert!(matches!(picked, Err(NodeDbError::TaskPanicked)));

    assert_eq!(f.db.get(rc.pubkey).unwrap(), Some(rc.clone()));
    f.db.remove(rc.pubkey).unwrap();
    assert_eq!(f.db.count().unwrap(), 0);
}

#[test]
fn test_get_random_honours_filter() {
    let f = fixture();
    assert_eq!(f.db.get_random(|_| true).unwrap(), None);

    let wanted = signed(50, NOW);
    f.db.put(wanted.clone()).unwrap();
    f.db.put(signed(51, NOW)).unwrap();
    f.db.put(signed(52, NOW)).unwrap();

    let id = wanted.pubkey;
    for _ in 0..10 {
        let picked = f.db.get_random(move |rc| rc.pubkey == id).unwrap();
        assert_eq!(picked, Some(wanted.clone()));
    }
    assert!(f.db.get_random(|_| false).unwrap().is_none());
}

#[test]
fn test_memory_only() {
    let disk = Arc::new(RecordingDisk::default());
    let db = NodeDb::open(&quiet_config(None), disk.clone(), Arc::new(ManualClock::new(NOW))).unwrap();

    assert!(db.archive().is_none());
    assert_eq!(db.load_from_disk().unwrap(), LoadReport::default());

    let rc = signed(60, NOW);
    db.put(rc.clone()).unwrap();
    db.remove(rc.pubkey).unwrap();
    db.tick(NOW + 10 * MIN5).unwrap();

    assert_eq!(db.save_to_disk().unwrap(), 0);
    assert!(disk.jobs().is_empty());
}

#[test]
fn test_open_rejects_file_root() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("nodedb");
    std::fs::write(&root, b"oops").unwrap();

    let result = NodeDb::open(
        &quiet_config(Some(&root)),
        Arc::new(InlineDisk),
        Arc::new(ManualClock::new(NOW)),
    );
    assert!(matches!(result, Err(NodeDbError::NotADirectory(_))));
}

#[test]
fn test_calls_after_shutdown_fail() {
    let f = fixture();
    f.db.shutdown();

    assert!(matches!(f.db.count(), Err(NodeDbError::Shutdown)));
    assert!(matches!(f.db.put(signed(70, NOW)), Err(NodeDbError::Shutdown)));
}
