use std::fs;
use std::path::PathBuf;

use nodestore::config::{ConfigLoader, DirectoryConfig, NodeStoreConfig};
use nodestore::{ApiError, DirType, NodeRole, PlainExtension, StartupOption, StorageState};
use tempfile::TempDir;

#[test]
fn file_values_override_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[storage]
role = "name_node"
check_lock_support = false

[[storage.directories]]
path = "/srv/name1"
dir_type = 3

[[storage.directories]]
path = "/srv/name2"

[storage.layout]
current_version = -20

[logging]
level = "debug"
output = "stdout"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&path).unwrap();
    assert_eq!(config.storage.role, NodeRole::NameNode);
    assert!(!config.storage.check_lock_support);
    assert_eq!(config.storage.directories.len(), 2);
    assert_eq!(config.storage.directories[0].dir_type, Some(DirType::new(3)));
    assert_eq!(config.storage.directories[1].dir_type, None);
    assert_eq!(config.storage.layout.current_version, -20);
    assert_eq!(config.storage.layout.last_upgradable_version, -7);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.output, "stdout");
}

#[test]
fn invalid_layout_ordering_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "[storage.layout]\ncurrent_version = -2\n").unwrap();

    match ConfigLoader::load_from_file(&path) {
        Err(ApiError::ConfigError(msg)) => assert!(msg.contains("current_version"), "{}", msg),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn missing_explicit_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigLoader::load_from_file(&temp_dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ApiError::ConfigError(_))));
}

#[test]
fn saved_config_loads_back() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");
    let mut config = NodeStoreConfig::default();
    config.storage.directories.push(DirectoryConfig {
        path: PathBuf::from("/srv/data1"),
        dir_type: Some(DirType::new(1)),
    });
    config.logging.format = "json".to_string();

    ConfigLoader::save(&path, &config).unwrap();
    let loaded = ConfigLoader::load_from_file(&path).unwrap();
    assert_eq!(loaded.storage.directories, config.storage.directories);
    assert_eq!(loaded.storage.role, NodeRole::DataNode);
    assert_eq!(loaded.logging.format, "json");
}

#[test]
fn configured_directories_open_and_format() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = NodeStoreConfig::default();
    for name in ["d1", "d2"] {
        config.storage.directories.push(DirectoryConfig {
            path: temp_dir.path().join(name),
            dir_type: None,
        });
    }

    let (mut storage, report) = config
        .storage
        .open(Box::new(PlainExtension::new()), StartupOption::Format)
        .unwrap();
    assert!(report
        .directories
        .iter()
        .all(|d| d.state == StorageState::NotFormatted));

    storage.set_namespace(8, 1);
    for idx in 0..storage.num_directories() {
        storage.format_directory(idx, |_| Ok(())).unwrap();
    }
    storage.unlock_all().unwrap();

    let (storage, report) = config
        .storage
        .open(Box::new(PlainExtension::new()), StartupOption::Regular)
        .unwrap();
    assert!(report.all_normal());
    assert_eq!(storage.info().namespace_id, 8);
}
