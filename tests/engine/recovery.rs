//! Safe-shutdown marker and the recovery-check flag.

use crate::common::*;
use std::fs;

#[test]
fn fresh_directory_needs_no_check() {
    let (_dir, engine) = new_engine();
    assert!(!engine.needs_recovery_check());
    let store = create_store(&engine, "shop.orders", "collection-1");
    assert!(!store.needs_recovery_check());
}

#[test]
fn crash_sets_recovery_flag() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path());
    let store = create_store(&engine, "shop.orders", "collection-1");
    let ids = insert_committed(&store, &[b"committed before crash"]);

    let crashed = crash_image(dir.path());
    drop(store);
    drop(engine);

    let engine = open_engine(crashed.path());
    assert!(engine.needs_recovery_check());
    let store = engine
        .get_record_store(&ns("shop.orders"), &ident("collection-1"))
        .unwrap();
    assert!(store.needs_recovery_check());
    assert_eq!(
        store.find_record(ids[0]).unwrap(),
        Some(b"committed before crash".to_vec())
    );
}

#[test]
fn clean_shutdown_clears_recovery_flag() {
    let dir = TempDir::new().unwrap();
    let crashed = {
        let engine = open_engine(dir.path());
        create_store(&engine, "shop.orders", "collection-1");
        crash_image(dir.path())
    };

    {
        let engine = open_engine(crashed.path());
        assert!(engine.needs_recovery_check());
        engine.clean_shutdown().unwrap();
    }

    let engine = open_engine(crashed.path());
    assert!(!engine.needs_recovery_check());
}

#[test]
fn marker_is_reset_right_after_startup() {
    let dir = TempDir::new().unwrap();
    drop(open_engine(dir.path()));

    // Previous shutdown was clean, but a crash right after this startup
    // must still be detected
    let engine = open_engine(dir.path());
    assert!(!engine.needs_recovery_check());
    assert!(!engine.catalog().is_after_safe_shutdown().unwrap());
    let crashed = crash_image(dir.path());
    drop(engine);

    let engine = open_engine(crashed.path());
    assert!(engine.needs_recovery_check());
}

#[test]
fn flag_is_latched_for_the_whole_run() {
    let dir = TempDir::new().unwrap();
    let crashed = {
        let _engine = open_engine(dir.path());
        crash_image(dir.path())
    };

    let engine = open_engine(crashed.path());
    assert!(engine.needs_recovery_check());
    create_store(&engine, "shop.orders", "collection-1");
    let store = engine
        .get_record_store(&ns("shop.orders"), &ident("collection-1"))
        .unwrap();
    assert!(engine.needs_recovery_check());
    assert!(store.needs_recovery_check());
}

#[test]
fn failed_pool_close_is_not_a_clean_shutdown() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open_engine(dir.path());
        create_store(&engine, "shop.orders", "collection-1");
        fs::remove_file(dir.path().join("collection-1")).unwrap();
        assert!(engine.clean_shutdown().is_err());
        assert!(engine.is_closed());
    }

    let engine = open_engine(dir.path());
    assert!(engine.needs_recovery_check());
}
