//! Change objects finalized through recovery units.

use crate::common::*;
use pmstore::{Change, FinalizeStats, Record};

#[test]
fn every_change_finalized_exactly_once_on_commit() {
    let (_dir, engine) = new_engine();
    let store = create_store(&engine, "shop.orders", "collection-1");

    let mut ru = RecoveryUnit::new();
    for i in 0..10u8 {
        store.insert_record(&mut ru, &[i; 16]).unwrap();
    }
    assert_eq!(ru.pending(), 10);

    let stats = ru.commit_unit_of_work().unwrap();
    assert_eq!(stats, FinalizeStats { applied: 10, failed: 0 });

    // Drained: neither a second commit nor an abort touches them again
    assert_eq!(ru.commit_unit_of_work().unwrap().applied, 0);
    assert_eq!(ru.abort_unit_of_work().unwrap().applied, 0);
    drop(ru);
    assert_eq!(store.num_records(), 10);
}

#[test]
fn every_change_finalized_exactly_once_on_abort() {
    let (_dir, engine) = new_engine();
    let store = create_store(&engine, "shop.orders", "collection-1");
    let existing = insert_committed(&store, &[b"a", b"b", b"c"]);

    let mut ru = RecoveryUnit::new();
    store.insert_record(&mut ru, b"d").unwrap();
    for id in &existing {
        store.delete_record(&mut ru, *id).unwrap();
    }
    assert_eq!(store.num_records(), 1);

    let stats = ru.abort_unit_of_work().unwrap();
    assert_eq!(stats.applied, 4);
    assert_eq!(ru.abort_unit_of_work().unwrap().applied, 0);
    assert_eq!(store.num_records(), 3);
}

#[test]
fn rollback_restores_removed_payload() {
    let (_dir, engine) = new_engine();
    let store = create_store(&engine, "shop.orders", "collection-1");
    let ids = insert_committed(&store, &[b"original payload"]);

    let mut ru = RecoveryUnit::new();
    store.delete_record(&mut ru, ids[0]).unwrap();
    assert_eq!(store.find_record(ids[0]).unwrap(), None);
    ru.abort_unit_of_work().unwrap();

    let restored = store.record_map().find(ids[0]).unwrap();
    assert_eq!(restored, Some(Record::new(ids[0], b"original payload".to_vec())));
    assert_eq!(store.data_size(), 16);
}

#[test]
fn commit_of_removal_leaves_no_trace() {
    let (_dir, engine) = new_engine();
    let store = create_store(&engine, "shop.orders", "collection-1");
    let ids = insert_committed(&store, &[b"to be removed"]);

    let mut ru = RecoveryUnit::new();
    store.delete_record(&mut ru, ids[0]).unwrap();
    ru.commit_unit_of_work().unwrap();

    assert_eq!(store.find_record(ids[0]).unwrap(), None);
    assert_eq!(store.num_records(), 0);
    assert_eq!(store.data_size(), 0);
}

#[test]
fn insert_rollback_after_concurrent_removal_is_noop() {
    let (_dir, engine) = new_engine();
    let store = create_store(&engine, "shop.orders", "collection-1");

    let loc = store.record_map().insert(b"racy").unwrap();
    let change = Change::insert(store.record_map().clone(), loc);
    store.record_map().remove(loc).unwrap();

    change.rollback().unwrap();
    assert_eq!(store.num_records(), 0);
}

#[test]
fn dropped_unit_rolls_back() {
    let (_dir, engine) = new_engine();
    let store = create_store(&engine, "shop.orders", "collection-1");
    {
        let mut ru = RecoveryUnit::new();
        store.insert_record(&mut ru, b"uncommitted").unwrap();
        assert_eq!(store.num_records(), 1);
    }
    assert_eq!(store.num_records(), 0);
}

#[test]
fn committed_changes_survive_restart_and_aborted_do_not() {
    let dir = TempDir::new().unwrap();
    let (kept, discarded) = {
        let engine = open_engine(dir.path());
        let store = create_store(&engine, "shop.orders", "collection-1");

        let kept = insert_committed(&store, &[b"kept"])[0];
        let mut ru = RecoveryUnit::new();
        let discarded = store.insert_record(&mut ru, b"discarded").unwrap();
        ru.abort_unit_of_work().unwrap();
        (kept, discarded)
    };

    let engine = open_engine(dir.path());
    let store = engine
        .get_record_store(&ns("shop.orders"), &ident("collection-1"))
        .unwrap();
    assert_eq!(store.find_record(kept).unwrap(), Some(b"kept".to_vec()));
    assert_eq!(store.find_record(discarded).unwrap(), None);
    assert_eq!(store.num_records(), 1);
}
