//! Interrupted writes and damaged state on disk.

use std::fs;

use ntest::timeout;
use tempfile::tempdir;

use version_store_core::index::LOCK_FILE;
use version_store_core::store::io_utils::stage_temp;
use version_store_core::{IndexManager, VersionCreator, VersionError, VersioningConfig};

use crate::helpers::{config, csv_dataset, CUSTOMER_COLUMNS};

#[timeout(10000)]
#[test]
fn test_crash_before_rename_keeps_previous_index() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let creator = VersionCreator::new(&config);
    creator
        .create(&csv_dataset(5, &CUSTOMER_COLUMNS), "raw.csv", None, None)
        .unwrap();
    let index_path = config.index_path();
    let before = fs::read(&index_path).unwrap();

    // Simulate a writer that died after staging its temp file.
    stage_temp(&index_path, b"{\"schema_version\":1,\"revision\":2,\"versio").unwrap();

    let index = IndexManager::new(&config).load().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(fs::read(&index_path).unwrap(), before);

    // Later writers are unaffected by the leftover.
    let created = creator
        .create(&csv_dataset(6, &CUSTOMER_COLUMNS), "raw.csv", None, None)
        .unwrap();
    assert_eq!(created.record.id, "v2");
}

#[timeout(10000)]
#[test]
fn test_abandoned_lock_is_broken_after_staleness_bound() {
    let dir = tempdir().unwrap();
    let config = VersioningConfig {
        lock_stale_after_secs: 0,
        ..config(dir.path())
    };
    fs::create_dir_all(dir.path()).unwrap();
    fs::write(dir.path().join(LOCK_FILE), b"{\"pid\":1}").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));

    let created = VersionCreator::new(&config)
        .create(&csv_dataset(1, &CUSTOMER_COLUMNS), "raw.csv", None, None)
        .unwrap();
    assert_eq!(created.record.id, "v1");
    assert!(!dir.path().join(LOCK_FILE).exists());
}

#[timeout(5000)]
#[test]
fn test_fresh_lock_blocks_writers() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    fs::write(dir.path().join(LOCK_FILE), b"{}").unwrap();

    let err = VersionCreator::new(&config)
        .create(&csv_dataset(1, &CUSTOMER_COLUMNS), "raw.csv", None, None)
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(!config.index_path().exists());
    assert!(!dir.path().join("v1").exists());
}

#[timeout(5000)]
#[test]
fn test_corrupt_index_stops_every_writer() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    fs::write(
        config.index_path(),
        br#"{"schema_version":1,"revision":1,"updated_at":null,"active":"v2","versions":{}}"#,
    )
    .unwrap();

    let err = IndexManager::new(&config).load().unwrap_err();
    assert!(matches!(err, VersionError::CorruptIndex { .. }));

    let err = VersionCreator::new(&config)
        .create(&csv_dataset(1, &CUSTOMER_COLUMNS), "raw.csv", None, None)
        .unwrap_err();
    assert_eq!(err.exit_code(), 5);
    assert!(!dir.path().join("v1").exists());
}

#[timeout(5000)]
#[test]
fn test_tampered_payload_fails_verification() {
    let dir = tempdir().unwrap();
    let config = VersioningConfig {
        write_protect: false,
        ..config(dir.path())
    };
    VersionCreator::new(&config)
        .create(&csv_dataset(3, &CUSTOMER_COLUMNS), "raw.csv", None, None)
        .unwrap();
    fs::write(dir.path().join("v1").join("payload.csv"), b"tampered\n").unwrap();

    let err = version_store_core::VersionStore::new(&config)
        .verify("v1")
        .unwrap_err();
    assert!(matches!(err, VersionError::IntegrityMismatch { ref id, .. } if id == "v1"));
}
