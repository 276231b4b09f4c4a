use std::fs;
use std::path::Path;

use nodestore::storage::{LayoutVersions, StorageInfo};
use nodestore::{
    ErrorKind, NodeRole, PlainExtension, StartupOption, Storage, StorageDirectory, StorageError,
    StorageState, VersionRecord,
};
use tempfile::TempDir;

const CURRENT: i32 = -20;

fn layout() -> LayoutVersions {
    LayoutVersions {
        current: CURRENT,
        last_upgradable: -7,
    }
}

fn aggregate(roots: &[&Path]) -> Storage {
    let mut storage = Storage::new(NodeRole::DataNode, layout(), Box::new(PlainExtension::new()));
    for root in roots {
        storage.add_directory(StorageDirectory::new(*root));
    }
    storage
}

fn formatted(root: &Path, namespace_id: i32) -> StorageDirectory {
    let sd = StorageDirectory::new(root);
    sd.clear_directory().unwrap();
    sd.write(&VersionRecord::new(CURRENT, NodeRole::DataNode, namespace_id, 1000))
        .unwrap();
    sd
}

#[test]
fn fresh_directory_formats_then_reads_normal() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("data");

    let mut storage = aggregate(&[root.as_path()]);
    let report = storage.recover_all(StartupOption::Format).unwrap();
    assert_eq!(report.directories[0].state, StorageState::NotFormatted);
    assert!(root.is_dir());

    storage.set_namespace(42, 7);
    storage.format_directory(0, |_| Ok(())).unwrap();
    storage.unlock_all().unwrap();

    let mut reopened = aggregate(&[root.as_path()]);
    let report = reopened.recover_all(StartupOption::Regular).unwrap();
    assert!(report.all_normal());
    assert_eq!(
        *reopened.info(),
        StorageInfo {
            layout_version: CURRENT,
            namespace_id: 42,
            ctime: 7
        }
    );
    assert_eq!(reopened.registration_id(), "NS-42--20-7");
}

#[test]
fn crashed_upgrade_with_current_is_completed() {
    let temp_dir = TempDir::new().unwrap();
    let sd = formatted(temp_dir.path(), 9);
    fs::create_dir_all(sd.previous_tmp()).unwrap();
    fs::write(sd.previous_tmp().join("old"), b"snapshot").unwrap();

    let mut storage = aggregate(&[temp_dir.path()]);
    let report = storage.recover_all(StartupOption::Regular).unwrap();
    assert_eq!(report.directories[0].state, StorageState::CompleteUpgrade);
    assert!(report.directories[0].recovered());

    assert!(!sd.previous_tmp().exists());
    assert_eq!(fs::read(sd.previous_dir().join("old")).unwrap(), b"snapshot");
    assert_eq!(
        storage
            .directory_mut(0)
            .unwrap()
            .analyze_storage(StartupOption::Regular)
            .unwrap(),
        StorageState::Normal
    );
}

#[test]
fn crashed_upgrade_without_current_is_undone() {
    let temp_dir = TempDir::new().unwrap();
    let sd = StorageDirectory::new(temp_dir.path());
    fs::create_dir_all(sd.previous_tmp()).unwrap();
    let record = VersionRecord::new(CURRENT, NodeRole::DataNode, 9, 0);
    record.write_to(&sd.previous_tmp().join("VERSION")).unwrap();

    let mut storage = aggregate(&[temp_dir.path()]);
    let report = storage.recover_all(StartupOption::Regular).unwrap();
    assert_eq!(report.directories[0].state, StorageState::RecoverUpgrade);
    assert!(!sd.previous_tmp().exists());
    assert_eq!(sd.read().unwrap(), record);
    assert_eq!(storage.info().namespace_id, 9);
}

#[test]
fn interrupted_rollback_and_checkpoint_are_recovered() {
    let temp_dir = TempDir::new().unwrap();
    let rollback = temp_dir.path().join("rollback");
    let checkpoint = temp_dir.path().join("checkpoint");

    let sd = formatted(&rollback, 3);
    fs::create_dir_all(sd.removed_tmp()).unwrap();
    let sd = formatted(&checkpoint, 3);
    fs::create_dir_all(sd.last_checkpoint_tmp()).unwrap();
    fs::create_dir_all(sd.previous_checkpoint()).unwrap();
    fs::write(sd.last_checkpoint_tmp().join("image"), b"new").unwrap();

    let mut storage = aggregate(&[rollback.as_path(), checkpoint.as_path()]);
    let report = storage.recover_all(StartupOption::Regular).unwrap();
    let states: Vec<StorageState> = report.directories.iter().map(|d| d.state).collect();
    assert_eq!(
        states,
        vec![StorageState::CompleteRollback, StorageState::CompleteCheckpoint]
    );
    assert!(!StorageDirectory::new(&rollback).removed_tmp().exists());
    let sd = StorageDirectory::new(&checkpoint);
    assert!(!sd.last_checkpoint_tmp().exists());
    assert_eq!(fs::read(sd.previous_checkpoint().join("image")).unwrap(), b"new");
}

#[test]
fn too_old_layout_is_rejected_at_startup() {
    let temp_dir = TempDir::new().unwrap();
    let sd = StorageDirectory::new(temp_dir.path());
    sd.clear_directory().unwrap();
    sd.write(&VersionRecord::new(-5, NodeRole::DataNode, 1, 0))
        .unwrap();

    let mut storage = aggregate(&[temp_dir.path()]);
    let err = storage.recover_all(StartupOption::Regular).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionIncompatible);
    let msg = err.to_string();
    assert!(msg.contains("-5") && msg.contains("-7"), "{}", msg);
}

#[test]
fn mismatched_namespaces_are_inconsistent() {
    let temp_dir = TempDir::new().unwrap();
    let a = temp_dir.path().join("a");
    let b = temp_dir.path().join("b");
    formatted(&a, 1);
    formatted(&b, 2);

    for root in [&a, &b] {
        let mut sd = StorageDirectory::new(root);
        assert_eq!(
            sd.analyze_storage(StartupOption::Regular).unwrap(),
            StorageState::Normal
        );
    }

    let mut storage = aggregate(&[a.as_path(), b.as_path()]);
    let err = storage.recover_all(StartupOption::Regular).unwrap_err();
    assert!(matches!(err, StorageError::InconsistentState { ref root, .. } if *root == b));
}

#[test]
fn missing_roots_are_dropped_from_the_aggregate() {
    let temp_dir = TempDir::new().unwrap();
    let present = temp_dir.path().join("present");
    let missing = temp_dir.path().join("missing");
    formatted(&present, 5);

    let mut storage = aggregate(&[missing.as_path(), present.as_path()]);
    let report = storage.recover_all(StartupOption::Regular).unwrap();
    assert_eq!(report.dropped, vec![missing.clone()]);
    assert_eq!(storage.num_directories(), 1);
    assert_eq!(storage.directory(0).unwrap().root(), present.as_path());
    assert!(!missing.exists());
}

#[test]
fn plain_file_root_is_treated_as_missing() {
    let temp_dir = TempDir::new().unwrap();
    let file_root = temp_dir.path().join("not-a-dir");
    fs::write(&file_root, b"").unwrap();

    let mut sd = StorageDirectory::new(&file_root);
    assert_eq!(
        sd.analyze_storage(StartupOption::Format).unwrap(),
        StorageState::NonExistent
    );
    assert!(!sd.is_locked());
}

#[test]
fn unrecoverable_layout_is_never_repaired() {
    let temp_dir = TempDir::new().unwrap();
    let sd = StorageDirectory::new(temp_dir.path());
    fs::create_dir_all(sd.previous_dir()).unwrap();
    fs::create_dir_all(sd.current_dir()).unwrap();

    let mut storage = aggregate(&[temp_dir.path()]);
    let err = storage.recover_all(StartupOption::Regular).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InconsistentState);
    assert!(sd.previous_dir().exists());
}

#[cfg(unix)]
#[test]
fn second_aggregate_cannot_share_a_directory() {
    let temp_dir = TempDir::new().unwrap();
    formatted(temp_dir.path(), 5);

    let mut first = aggregate(&[temp_dir.path()]);
    first.recover_all(StartupOption::Regular).unwrap();

    let mut second = aggregate(&[temp_dir.path()]);
    let err = second.recover_all(StartupOption::Regular).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LockUnavailable);

    first.unlock_all().unwrap();
    second.unlock_all().unwrap();
    let report = second.recover_all(StartupOption::Regular).unwrap();
    assert!(report.all_normal());
}

#[cfg(unix)]
#[test]
fn lock_support_is_reported_on_local_disk() {
    let temp_dir = TempDir::new().unwrap();
    formatted(temp_dir.path(), 5);

    let mut storage = aggregate(&[temp_dir.path()]);
    storage.recover_all(StartupOption::Regular).unwrap();
    assert!(storage.is_lock_supported(0).unwrap());
    assert!(storage.directory(0).unwrap().is_locked());
}

#[test]
fn write_all_restamps_older_layout() {
    let temp_dir = TempDir::new().unwrap();
    let sd = StorageDirectory::new(temp_dir.path());
    sd.clear_directory().unwrap();
    sd.write(&VersionRecord::new(-9, NodeRole::DataNode, 4, 11).with_extra("storageID", "DS-1"))
        .unwrap();

    let mut storage = aggregate(&[temp_dir.path()]);
    storage.recover_all(StartupOption::Regular).unwrap();
    assert_eq!(storage.info().layout_version, -9);

    storage.write_all().unwrap();
    let record = sd.read().unwrap();
    assert_eq!(record.layout_version, CURRENT);
    assert_eq!(record.namespace_id, 4);
    assert_eq!(record.extra["storageID"], "DS-1");
}
