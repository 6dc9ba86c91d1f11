//! Record store lifecycle: open, create, get and restart.

use crate::common::*;
use pmstore::MIN_POOL_SIZE;
use std::fs;
use std::sync::Arc;

#[test]
fn reopen_yields_same_idents() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open_engine(dir.path());
        create_store(&engine, "shop.orders", "collection-1");
        create_store(&engine, "shop.users", "collection-2");
        create_store(&engine, "local.startup_log", "collection-3");
        engine.clean_shutdown().unwrap();
    }

    let expected = vec![
        ident("collection-1"),
        ident("collection-2"),
        ident("collection-3"),
    ];
    for _ in 0..2 {
        let engine = open_engine(dir.path());
        assert_eq!(engine.all_idents().unwrap(), expected);
        assert!(!engine.needs_recovery_check());
        assert_eq!(
            engine.ident_namespace(&ident("collection-2")).unwrap(),
            Some(ns("shop.users"))
        );
    }
}

#[test]
fn create_then_get_resolves_same_pool() {
    let (_dir, engine) = new_engine();
    let created = create_store(&engine, "shop.orders", "collection-1");

    let fetched = engine
        .get_record_store(&ns("shop.orders"), &ident("collection-1"))
        .unwrap();
    assert!(Arc::ptr_eq(created.record_map(), fetched.record_map()));
    assert!(created
        .record_map()
        .pool()
        .ptr_eq(fetched.record_map().pool()));
    assert_eq!(engine.open_pool_count(), 1);
    assert_eq!(
        engine.ident_namespace(&ident("collection-1")).unwrap(),
        Some(ns("shop.orders"))
    );
}

#[test]
fn get_updates_namespace() {
    let (_dir, engine) = new_engine();
    create_store(&engine, "shop.orders", "collection-1");

    let renamed = engine
        .get_record_store(&ns("shop.archived_orders"), &ident("collection-1"))
        .unwrap();
    assert_eq!(renamed.ns(), &ns("shop.archived_orders"));
    assert_eq!(
        engine.ident_namespace(&ident("collection-1")).unwrap(),
        Some(ns("shop.archived_orders"))
    );
    assert_eq!(engine.all_idents().unwrap().len(), 1);
}

#[test]
fn records_survive_restart() {
    let dir = TempDir::new().unwrap();
    let ids = {
        let engine = open_engine(dir.path());
        let store = create_store(&engine, "shop.orders", "collection-1");
        insert_committed(&store, &[b"order-1", b"order-22"])
    };

    let engine = open_engine(dir.path());
    let store = engine
        .get_record_store(&ns("shop.orders"), &ident("collection-1"))
        .unwrap();
    assert_eq!(store.num_records(), 2);
    assert_eq!(store.data_size(), 15);
    assert_eq!(store.find_record(ids[1]).unwrap(), Some(b"order-22".to_vec()));
}

#[test]
fn failed_create_leaves_nothing_registered() {
    let (dir, engine) = new_engine();
    let blocked = dir.path().join("collection-1");
    fs::create_dir(&blocked).unwrap();

    let err = engine
        .create_record_store(
            &ns("shop.orders"),
            &ident("collection-1"),
            &CollectionOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, PmseError::Corruption { .. }));
    assert!(!engine.has_ident(&ident("collection-1")).unwrap());
    assert_eq!(engine.open_pool_count(), 0);
    assert!(blocked.is_dir());

    fs::remove_dir(&blocked).unwrap();
    let store = create_store(&engine, "shop.orders", "collection-1");
    assert_eq!(store.num_records(), 0);
}

#[test]
fn oversized_record_is_out_of_space() {
    let (_dir, engine) = new_engine();
    let store = create_store(&engine, "shop.blobs", "collection-1");

    let mut ru = RecoveryUnit::new();
    let err = store
        .insert_record(&mut ru, &vec![7u8; MIN_POOL_SIZE as usize])
        .unwrap_err();
    assert!(err.is_out_of_space());
    assert_eq!(ru.pending(), 0);
    assert_eq!(store.num_records(), 0);

    // The pool is still usable
    insert_committed(&store, &[b"small"]);
    assert_eq!(store.num_records(), 1);
}

#[test]
fn pool_size_follows_namespace_policy() {
    let dir = TempDir::new().unwrap();
    let config = test_config().with_user_pool_size(2 * MIN_POOL_SIZE);
    let engine = Engine::open_with_config(dir.path(), config).unwrap();

    create_store(&engine, "local.startup_log", "system-1");
    create_store(&engine, "shop.orders", "user-1");
    engine
        .create_record_store(
            &ns("shop.big"),
            &ident("explicit-1"),
            &CollectionOptions::with_pool_size(3 * MIN_POOL_SIZE),
        )
        .unwrap();

    let len = |name: &str| fs::metadata(dir.path().join(name)).unwrap().len();
    assert_eq!(len("system-1"), MIN_POOL_SIZE);
    assert_eq!(len("user-1"), 2 * MIN_POOL_SIZE);
    assert_eq!(len("explicit-1"), 3 * MIN_POOL_SIZE);
}

#[test]
fn create_reuses_leftover_pool_file() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open_engine(dir.path());
        let store = create_store(&engine, "shop.orders", "collection-1");
        insert_committed(&store, &[b"left behind"]);
    }
    {
        // Catalog entry gone, pool file still there
        let engine = open_engine(dir.path());
        engine
            .catalog()
            .delete_kv(&ident("collection-1"))
            .unwrap();
    }

    let engine = open_engine(dir.path());
    let store = create_store(&engine, "shop.orders", "collection-1");
    assert_eq!(store.num_records(), 1);
}

#[test]
fn refused_open_keeps_running_config() {
    let dir = TempDir::new().unwrap();
    let config = test_config().with_user_pool_size(MIN_POOL_SIZE * 2);
    let _engine = Engine::open_with_config(dir.path(), config).unwrap();

    let err = Engine::open_with_config(
        dir.path(),
        test_config().with_user_pool_size(MIN_POOL_SIZE * 5),
    )
    .unwrap_err();
    assert!(err.is_fatal());

    let on_disk = EngineConfig::from_file(&dir.path().join(pmstore::CONFIG_FILE_NAME)).unwrap();
    assert_eq!(on_disk.user_pool_size, MIN_POOL_SIZE * 2);
}

#[test]
fn scratch_suffix_idents_are_rejected() {
    let (dir, engine) = new_engine();
    let err = engine
        .create_record_store(
            &ns("shop.orders"),
            &ident("a.pmtmp"),
            &CollectionOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, PmseError::InvalidIdent { .. }));
    assert!(!engine.has_ident(&ident("a.pmtmp")).unwrap());

    // Commits on "a" never leave a file an ident could own
    let store = create_store(&engine, "shop.orders", "a");
    insert_committed(&store, &[b"payload"]);
    assert!(!dir.path().join("a.pmtmp").exists());
}

#[test]
fn stale_scratch_file_is_removed_on_open() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open_engine(dir.path());
        let store = create_store(&engine, "shop.orders", "collection-1");
        insert_committed(&store, &[b"kept"]);
    }
    // Crash mid-commit: scratch image written, never renamed
    let scratch = dir.path().join("collection-1.pmtmp");
    fs::write(&scratch, b"partial image").unwrap();

    let engine = open_engine(dir.path());
    let store = engine
        .get_record_store(&ns("shop.orders"), &ident("collection-1"))
        .unwrap();
    assert_eq!(store.num_records(), 1);
    assert!(!scratch.exists());
}
