//! Dropping idents: catalog first, storage best-effort.

use crate::common::*;
use std::fs;

#[test]
fn drop_removes_entry_pool_and_file() {
    let (dir, engine) = new_engine();
    create_store(&engine, "shop.orders", "collection-1");
    create_store(&engine, "shop.users", "collection-2");

    engine.drop_ident(&ident("collection-1")).unwrap();

    assert!(!engine.has_ident(&ident("collection-1")).unwrap());
    assert_eq!(engine.all_idents().unwrap(), vec![ident("collection-2")]);
    assert_eq!(engine.open_pool_count(), 1);
    assert!(!dir.path().join("collection-1").exists());
    assert!(dir.path().join("collection-2").exists());
}

#[test]
fn drop_succeeds_when_pool_close_fails() {
    let (dir, engine) = new_engine();
    let store = create_store(&engine, "shop.orders", "collection-1");
    insert_committed(&store, &[b"stale"]);

    // Pool file vanishes underneath the engine; closing it will fail
    fs::remove_file(dir.path().join("collection-1")).unwrap();
    engine.drop_ident(&ident("collection-1")).unwrap();

    assert!(!engine.has_ident(&ident("collection-1")).unwrap());
    assert_eq!(engine.open_pool_count(), 0);
    assert!(store.find_record(pmstore::RecordId::new(1)).is_err());

    let recreated = engine
        .create_record_store(
            &ns("shop.orders_v2"),
            &ident("collection-1"),
            &CollectionOptions::default(),
        )
        .unwrap();
    assert_eq!(recreated.num_records(), 0);
    assert_eq!(
        engine.ident_namespace(&ident("collection-1")).unwrap(),
        Some(ns("shop.orders_v2"))
    );
}

#[test]
fn drop_removes_directory_storage() {
    let (dir, engine) = new_engine();
    create_store(&engine, "shop.orders", "collection-1");
    engine.drop_ident(&ident("collection-1")).unwrap();

    // Something else took the path; a drop still clears it
    let path = dir.path().join("collection-1");
    fs::create_dir_all(path.join("nested")).unwrap();
    engine.catalog().insert_kv(&ident("collection-1"), &ns("shop.orders")).unwrap();
    engine.drop_ident(&ident("collection-1")).unwrap();
    assert!(!path.exists());
}

#[test]
fn drop_unknown_ident_is_noop() {
    let (_dir, engine) = new_engine();
    create_store(&engine, "shop.orders", "collection-1");
    engine.drop_ident(&ident("never-created")).unwrap();
    assert_eq!(engine.all_idents().unwrap(), vec![ident("collection-1")]);
}

#[test]
fn drop_persists_across_restart() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open_engine(dir.path());
        create_store(&engine, "shop.orders", "collection-1");
        create_store(&engine, "shop.users", "collection-2");
        engine.drop_ident(&ident("collection-2")).unwrap();
    }

    let engine = open_engine(dir.path());
    assert_eq!(engine.all_idents().unwrap(), vec![ident("collection-1")]);
    let err = engine
        .get_record_store(&ns("shop.users"), &ident("collection-2"))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn drop_index_unlinks_it_from_collection() {
    let (_dir, engine) = new_engine();
    create_store(&engine, "shop.orders", "collection-1");
    let descriptor = IndexDescriptor::new("customer_1", "shop.orders");
    engine
        .create_sorted_data_interface(&ident("index-1"), &descriptor)
        .unwrap();

    engine.drop_ident(&ident("index-1")).unwrap();
    assert!(!engine.has_ident(&ident("index-1")).unwrap());
    let err = engine
        .get_sorted_data_interface(&ident("index-1"), &descriptor)
        .unwrap_err();
    assert!(err.is_not_found());

    // Same name can be created again
    let index = engine
        .create_sorted_data_interface(&ident("index-1"), &descriptor)
        .unwrap();
    assert!(index.is_empty().unwrap());
}

#[test]
fn drop_refuses_engine_files() {
    let (dir, engine) = new_engine();
    create_store(&engine, "shop.orders", "collection-1");

    for name in ["pmse.lock", "pmse_identlist", "pmse.toml"] {
        let err = engine.drop_ident(&ident(name)).unwrap_err();
        assert!(matches!(err, PmseError::InvalidIdent { .. }));
        assert!(dir.path().join(name).exists());
    }

    // Directory is still locked and the catalog still intact
    let err = Engine::open_with_config(dir.path(), test_config()).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(engine.all_idents().unwrap(), vec![ident("collection-1")]);
}

#[test]
fn drop_collection_drops_its_index_idents() {
    let (_dir, engine) = new_engine();
    create_store(&engine, "shop.orders", "collection-1");
    create_store(&engine, "shop.users", "collection-2");
    engine
        .create_sorted_data_interface(
            &ident("index-orders"),
            &IndexDescriptor::new("customer_1", "shop.orders"),
        )
        .unwrap();
    engine
        .create_sorted_data_interface(
            &ident("index-users"),
            &IndexDescriptor::new("email_1", "shop.users"),
        )
        .unwrap();

    engine.drop_ident(&ident("collection-1")).unwrap();

    assert_eq!(
        engine.all_idents().unwrap(),
        vec![ident("collection-2"), ident("index-users")]
    );
}

#[test]
fn drop_collection_after_restart_drops_its_index_idents() {
    let dir = TempDir::new().unwrap();
    {
        let engine = open_engine(dir.path());
        create_store(&engine, "shop.orders", "collection-1");
        engine
            .create_sorted_data_interface(
                &ident("index-1"),
                &IndexDescriptor::new("customer_1", "shop.orders"),
            )
            .unwrap();
    }

    let engine = open_engine(dir.path());
    engine.drop_ident(&ident("collection-1")).unwrap();
    assert!(engine.all_idents().unwrap().is_empty());
    assert_eq!(engine.open_pool_count(), 0);
}

#[test]
fn drop_index_leaves_unopened_pools_closed() {
    let dir = TempDir::new().unwrap();
    let descriptor = IndexDescriptor::new("customer_1", "shop.orders");
    {
        let engine = open_engine(dir.path());
        create_store(&engine, "shop.orders", "collection-1");
        create_store(&engine, "shop.users", "collection-2");
        engine
            .create_sorted_data_interface(&ident("index-1"), &descriptor)
            .unwrap();
    }

    let engine = open_engine(dir.path());
    engine.drop_ident(&ident("index-1")).unwrap();
    assert_eq!(engine.open_pool_count(), 0);

    // The stale node is unlinked once the collection pool is opened
    let err = engine
        .get_sorted_data_interface(&ident("index-1"), &descriptor)
        .unwrap_err();
    assert!(err.is_not_found());
    let store = engine
        .get_record_store(&ns("shop.orders"), &ident("collection-1"))
        .unwrap();
    assert!(pmstore::IndexCatalog::new(store.record_map().pool().clone())
        .names()
        .unwrap()
        .is_empty());

    let index = engine
        .create_sorted_data_interface(&ident("index-1"), &descriptor)
        .unwrap();
    assert!(index.is_empty().unwrap());
}
