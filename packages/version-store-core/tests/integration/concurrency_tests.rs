//! Several writers racing on one storage root.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use ntest::timeout;
use tempfile::tempdir;

use version_store_core::{
    CreatedVersion, IndexManager, RollbackController, VersionCreator, VersionStore,
};

use crate::helpers::{config, csv_dataset, CUSTOMER_COLUMNS};

const WRITERS: usize = 6;

fn create_with_retry(creator: &VersionCreator, rows: u64) -> (CreatedVersion, usize) {
    let dataset = csv_dataset(rows, &CUSTOMER_COLUMNS);
    let mut conflicts = 0;
    loop {
        match creator.create(&dataset, "raw.csv", None, None) {
            Ok(created) => return (created, conflicts),
            Err(e) if e.is_retryable() => {
                conflicts += 1;
                thread::sleep(Duration::from_millis(2));
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}

#[timeout(30000)]
#[test]
fn test_racing_creators_get_distinct_ids() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|i| {
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let creator = VersionCreator::new(&config);
                barrier.wait();
                create_with_retry(&creator, 10 + i as u64)
            })
        })
        .collect();

    let mut ids: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().0.record.id)
        .collect();
    ids.sort_by_key(|id| id[1..].parse::<u64>().unwrap());

    let expected: Vec<String> = (1..=WRITERS).map(|n| format!("v{}", n)).collect();
    assert_eq!(ids, expected);

    let index = IndexManager::new(&config).load().unwrap();
    assert_eq!(index.len(), WRITERS);
    assert_eq!(index.revision, WRITERS as u64);
    assert!(index.active.is_some());

    let store = VersionStore::new(&config);
    for id in index.ids() {
        store.verify(id).unwrap();
    }
    assert!(store.unreferenced_dirs(&index, "v").unwrap().is_empty());
}

#[timeout(30000)]
#[test]
fn test_rollback_racing_creation_never_loses_a_write() {
    let dir = tempdir().unwrap();
    let config = config(dir.path());
    let creator = VersionCreator::new(&config);
    create_with_retry(&creator, 1);
    create_with_retry(&creator, 2);

    let rollback_config = config.clone();
    let rollbacks = thread::spawn(move || {
        let controller = RollbackController::new(&rollback_config);
        let mut done = 0;
        while done < 5 {
            let target = if done % 2 == 0 { "v1" } else { "v2" };
            match controller.rollback(target) {
                Ok(_) => done += 1,
                Err(e) if e.is_retryable() => thread::sleep(Duration::from_millis(1)),
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    });
    for rows in 3..8 {
        create_with_retry(&creator, rows);
    }
    rollbacks.join().unwrap();

    let index = IndexManager::new(&config).read().unwrap();
    assert_eq!(
        index.ids().collect::<Vec<_>>(),
        vec!["v1", "v2", "v3", "v4", "v5", "v6", "v7"]
    );
    assert!(index.active.is_some());
}
