//! Stored versions never change and ids only move forward.

use std::fs;

use ntest::timeout;
use tempfile::tempdir;

use version_store_core::{IndexManager, VersionCreator, VersionError, VersionStore};

use crate::helpers::{config, csv_dataset, protected_config, WritableOnDrop, CUSTOMER_COLUMNS};

#[timeout(10000)]
#[test]
fn test_read_is_stable_across_later_creations() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let creator = VersionCreator::new(&config);
    let store = VersionStore::new(&config);

    creator
        .create(&csv_dataset(25, &CUSTOMER_COLUMNS), "raw.csv", Some(0.5), None)
        .unwrap();
    let first = store.read("v1").unwrap();
    assert_eq!(store.read("v1").unwrap(), first);

    for rows in [26, 27, 28] {
        creator
            .create(&csv_dataset(rows, &CUSTOMER_COLUMNS), "raw.csv", None, None)
            .unwrap();
    }
    assert_eq!(store.read("v1").unwrap(), first);
    assert_eq!(store.verify("v1").unwrap(), first.manifest);
}

#[timeout(10000)]
#[test]
fn test_ids_stay_monotonic_through_failures() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let creator = VersionCreator::new(&config);
    let good = csv_dataset(3, &CUSTOMER_COLUMNS);

    assert_eq!(creator.create(&good, "a.csv", None, None).unwrap().record.id, "v1");

    // Rejected before allocation: no id consumed.
    let err = creator.create(&good, "a.csv", Some(-0.1), None).unwrap_err();
    assert!(matches!(err, VersionError::InvalidDataset(_)));
    let mut bad_ext = good.clone();
    bad_ext.extension = String::new();
    assert!(creator.create(&bad_ext, "a.csv", None, None).is_err());

    assert_eq!(creator.create(&good, "a.csv", None, None).unwrap().record.id, "v2");

    // A failure after allocation leaves v3 behind; it is skipped, not reused.
    fs::create_dir(dir.path().join("v3")).unwrap();
    assert_eq!(creator.create(&good, "a.csv", None, None).unwrap().record.id, "v4");
    assert_eq!(creator.create(&good, "a.csv", None, None).unwrap().record.id, "v5");

    let index = IndexManager::new(&config).read().unwrap();
    assert_eq!(index.ids().collect::<Vec<_>>(), vec!["v1", "v2", "v4", "v5"]);
    assert_eq!(index.revision, 4);
}

#[timeout(5000)]
#[test]
fn test_completed_versions_are_write_protected() {
    let dir = tempdir().unwrap();
    let _restore = WritableOnDrop(dir.path().to_path_buf());
    let config = protected_config(dir.path());
    let created = VersionCreator::new(&config)
        .create(&csv_dataset(2, &CUSTOMER_COLUMNS), "raw.csv", None, None)
        .unwrap();

    let version_dir = dir.path().join(&created.record.storage_path);
    for path in [
        version_dir.clone(),
        version_dir.join("manifest.json"),
        version_dir.join("payload.csv"),
    ] {
        let permissions = fs::metadata(&path).unwrap().permissions();
        assert!(permissions.readonly(), "{} is writable", path.display());
    }
}

#[timeout(5000)]
#[test]
fn test_write_protect_can_be_disabled() {
    let dir = tempdir().unwrap();
    let config = version_store_core::VersioningConfig {
        write_protect: false,
        ..config(dir.path())
    };
    VersionCreator::new(&config)
        .create(&csv_dataset(2, &CUSTOMER_COLUMNS), "raw.csv", None, None)
        .unwrap();

    let permissions = fs::metadata(dir.path().join("v1").join("payload.csv"))
        .unwrap()
        .permissions();
    assert!(!permissions.readonly());
}

#[timeout(5000)]
#[test]
fn test_protected_tree_is_removable_after_restore() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("store");
    {
        let _restore = WritableOnDrop(root.clone());
        let config = protected_config(&root);
        let creator = VersionCreator::new(&config);
        for rows in [1, 2] {
            creator
                .create(&csv_dataset(rows, &CUSTOMER_COLUMNS), "raw.csv", None, None)
                .unwrap();
        }
        assert!(fs::metadata(root.join("v2")).unwrap().permissions().readonly());
    }
    fs::remove_dir_all(&root).unwrap();
    assert!(!root.exists());
}

#[timeout(5000)]
#[test]
fn test_record_matches_manifest() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let created = VersionCreator::new(&config)
        .create(&csv_dataset(7, &CUSTOMER_COLUMNS), "crm_export", Some(1.0), None)
        .unwrap();

    let manifest = VersionStore::new(&config).manifest("v1").unwrap();
    assert_eq!(manifest.file_hash, created.record.file_hash);
    assert_eq!(manifest.file_size_bytes, created.record.file_size_bytes);
    assert_eq!(manifest.columns, created.record.columns);
    assert_eq!(manifest.source, "crm_export");
    assert!(manifest.file_hash.starts_with("sha256:"));
}
