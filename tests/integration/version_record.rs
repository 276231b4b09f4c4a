use std::collections::BTreeMap;
use std::fs;

use nodestore::version::record::{KEY_CTIME, KEY_LAYOUT_VERSION, KEY_NAMESPACE_ID, KEY_ROLE};
use nodestore::{NodeRole, StorageDirectory, VersionRecord};
use proptest::prelude::*;
use tempfile::TempDir;

const RESERVED: [&str; 6] = [
    KEY_LAYOUT_VERSION,
    KEY_ROLE,
    KEY_NAMESPACE_ID,
    KEY_CTIME,
    "storageType",
    "namespaceID",
];

fn extra_fields() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        "[a-zA-Z][a-zA-Z0-9_.]{0,12}".prop_filter("reserved key", |k| !RESERVED.contains(&k.as_str())),
        "[ -~\n\r\\\\]{0,24}",
        0..6,
    )
}

fn role() -> impl Strategy<Value = NodeRole> {
    prop_oneof![Just(NodeRole::NameNode), Just(NodeRole::DataNode)]
}

proptest! {
    #[test]
    fn record_survives_encode_and_decode(
        layout_version in -64i32..0,
        role in role(),
        namespace_id in any::<i32>(),
        ctime in any::<i64>(),
        extra in extra_fields(),
    ) {
        let record = VersionRecord { layout_version, role, namespace_id, ctime, extra };
        let text = record.encode().unwrap();
        prop_assert!(text.starts_with('#'));
        prop_assert_eq!(VersionRecord::decode(&text).unwrap(), record);
    }
}

#[test]
fn legacy_key_names_are_accepted() {
    let text = "#Mon Jan 01 00:00:00 UTC 2024\n\
                namespaceID=77\n\
                cTime=0\n\
                storageType=DATA_NODE\n\
                layoutVersion=-18\n\
                storageID=DS-5\n";
    let record = VersionRecord::decode(text).unwrap();
    assert_eq!(record.namespace_id, 77);
    assert_eq!(record.role, NodeRole::DataNode);
    assert_eq!(record.extra.len(), 1);
    assert_eq!(record.extra["storageID"], "DS-5");
}

#[test]
fn missing_required_key_is_an_invalid_record() {
    let temp_dir = TempDir::new().unwrap();
    let sd = StorageDirectory::new(temp_dir.path());
    sd.clear_directory().unwrap();
    fs::write(sd.version_file(), "layoutVersion=-18\nrole=DATA_NODE\ncTime=0\n").unwrap();

    let err = sd.read().unwrap_err();
    assert_eq!(err.kind(), nodestore::ErrorKind::InconsistentState);
    assert!(err.to_string().contains("namespaceId"), "{}", err);
}

#[test]
fn write_replaces_the_record_without_leftovers() {
    let temp_dir = TempDir::new().unwrap();
    let sd = StorageDirectory::new(temp_dir.path());
    sd.clear_directory().unwrap();
    sd.write(&VersionRecord::new(-18, NodeRole::DataNode, 1, 0)).unwrap();
    sd.write(&VersionRecord::new(-18, NodeRole::DataNode, 2, 0)).unwrap();

    assert_eq!(sd.read().unwrap().namespace_id, 2);
    let names: Vec<String> = fs::read_dir(sd.current_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["VERSION".to_string()]);
}
