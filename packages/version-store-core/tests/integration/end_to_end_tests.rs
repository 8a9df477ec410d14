//! Create, compare and roll back through the public API.

use std::fs;

use ntest::timeout;
use tempfile::tempdir;

use version_store_core::comparator::ChangeDirection;
use version_store_core::{
    IndexManager, RollbackController, VersionComparator, VersionCreator, VersionStore,
};

use crate::helpers::{config, csv_dataset, customer_columns_v2, CUSTOMER_COLUMNS};

#[timeout(10000)]
#[test]
fn test_create_compare_rollback_scenario() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let creator = VersionCreator::new(&config);

    let v1 = creator
        .create(
            &csv_dataset(100, &CUSTOMER_COLUMNS),
            "raw/customers.csv",
            Some(0.92),
            None,
        )
        .unwrap();
    assert_eq!(v1.record.id, "v1");
    assert!(v1.activated);
    assert_eq!(v1.record.row_count, 100);
    assert_eq!(v1.record.column_count(), 5);
    assert_eq!(v1.record.quality_score, Some(0.92));

    let index = IndexManager::new(&config);
    assert_eq!(index.get_active().unwrap().unwrap().id, "v1");

    let v2 = creator
        .create(
            &csv_dataset(120, &customer_columns_v2()),
            "raw/customers.csv",
            Some(0.95),
            None,
        )
        .unwrap();
    assert_eq!(v2.record.id, "v2");
    assert_eq!(index.get_active().unwrap().unwrap().id, "v2");

    let comparator = VersionComparator::new(&config);
    let report = comparator.compare("v1", "v2").unwrap();
    assert_eq!(report.row_count_delta, 20);
    assert_eq!(report.columns_added, vec!["signup_date"]);
    assert!(report.columns_removed.is_empty());
    assert!(report.type_changes.is_empty());
    assert_eq!(report.direction, ChangeDirection::Increase);
    assert_eq!(report.percentage_change, 20.0);

    let written = comparator.save_report(&report, None).unwrap();
    assert_eq!(written, config.report_path());
    let saved: serde_json::Value =
        serde_json::from_slice(&fs::read(&written).unwrap()).unwrap();
    assert_eq!(saved["version_a"], "v1");
    assert_eq!(saved["row_count_delta"], 20);
    assert_eq!(saved["type_changes"], serde_json::json!([]));

    let store = VersionStore::new(&config);
    let manifests_before: Vec<Vec<u8>> = ["v1", "v2"]
        .iter()
        .map(|id| fs::read(dir.path().join(id).join("manifest.json")).unwrap())
        .collect();

    let outcome = RollbackController::new(&config).rollback("v1").unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.previous.as_deref(), Some("v2"));
    assert_eq!(index.get_active().unwrap().unwrap().id, "v1");

    let manifests_after: Vec<Vec<u8>> = ["v1", "v2"]
        .iter()
        .map(|id| fs::read(dir.path().join(id).join("manifest.json")).unwrap())
        .collect();
    assert_eq!(manifests_before, manifests_after);
    store.verify("v1").unwrap();
    store.verify("v2").unwrap();
}

#[timeout(10000)]
#[test]
fn test_rollback_round_trip_keeps_versions_intact() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let creator = VersionCreator::new(&config);
    for rows in [10, 20, 30] {
        creator
            .create(&csv_dataset(rows, &CUSTOMER_COLUMNS), "raw.csv", None, None)
            .unwrap();
    }
    let store = VersionStore::new(&config);
    let payloads_before: Vec<Vec<u8>> = ["v1", "v2", "v3"]
        .iter()
        .map(|id| store.read(id).unwrap().payload)
        .collect();

    let controller = RollbackController::new(&config);
    controller.rollback("v1").unwrap();
    controller.rollback("v3").unwrap();
    controller.rollback("v2").unwrap();
    controller.rollback("v2").unwrap();

    let index = IndexManager::new(&config).read().unwrap();
    assert_eq!(index.active.as_deref(), Some("v2"));
    assert_eq!(index.len(), 3);

    let history = controller.history().unwrap();
    let hops: Vec<(Option<&str>, &str)> = history
        .iter()
        .map(|e| (e.from_version.as_deref(), e.to_version.as_str()))
        .collect();
    assert_eq!(
        hops,
        vec![(Some("v3"), "v1"), (Some("v1"), "v3"), (Some("v3"), "v2")]
    );

    let payloads_after: Vec<Vec<u8>> = ["v1", "v2", "v3"]
        .iter()
        .map(|id| store.read(id).unwrap().payload)
        .collect();
    assert_eq!(payloads_before, payloads_after);
}

#[timeout(10000)]
#[test]
fn test_compare_is_symmetric_and_reflexive() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let creator = VersionCreator::new(&config);
    creator
        .create(&csv_dataset(50, &CUSTOMER_COLUMNS), "a.csv", None, None)
        .unwrap();
    creator
        .create(
            &csv_dataset(
                40,
                &[("customer_id", "string"), ("name", "string"), ("tier", "string")],
            ),
            "b.csv",
            None,
            None,
        )
        .unwrap();

    let comparator = VersionComparator::new(&config);
    let ab = comparator.compare("v1", "v2").unwrap();
    let ba = comparator.compare("v2", "v1").unwrap();
    assert_eq!(ab.row_count_delta, -ba.row_count_delta);
    assert_eq!(ab.columns_added, ba.columns_removed);
    assert_eq!(ab.columns_removed, ba.columns_added);
    assert_eq!(ab.type_changes.len(), 1);
    assert_eq!(ab.type_changes[0].column, "customer_id");
    assert_eq!(ab.type_changes[0].from, ba.type_changes[0].to);

    let aa = comparator.compare("v1", "v1").unwrap();
    assert!(aa.is_identical());
    assert_eq!(aa.row_count_delta, 0);
}

#[timeout(5000)]
#[test]
fn test_unknown_ids_are_not_found() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    VersionCreator::new(&config)
        .create(&csv_dataset(1, &CUSTOMER_COLUMNS), "a.csv", None, None)
        .unwrap();

    let comparator = VersionComparator::new(&config);
    let err = comparator.compare("v1", "v2").unwrap_err();
    assert_eq!(err.exit_code(), 4);

    let err = RollbackController::new(&config).rollback("v9").unwrap_err();
    assert!(err.to_string().contains("v9"));
}
