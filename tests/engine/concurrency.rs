//! Structural and record operations from many threads.

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;

#[test]
fn concurrent_creates_register_every_collection() {
    let (_dir, engine) = new_engine();
    let engine = Arc::new(engine);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let store = create_store(&engine, &format!("db.coll{}", t), &format!("collection-{}", t));
                for i in 0..20u32 {
                    let mut ru = RecoveryUnit::new();
                    store.insert_record(&mut ru, &i.to_le_bytes()).unwrap();
                    ru.commit_unit_of_work().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.all_idents().unwrap().len(), THREADS);
    assert_eq!(engine.open_pool_count(), THREADS);
    for t in 0..THREADS {
        let store = engine
            .get_record_store(&ns(&format!("db.coll{}", t)), &ident(&format!("collection-{}", t)))
            .unwrap();
        assert_eq!(store.num_records(), 20);
    }
}

#[test]
fn racing_creates_of_one_ident_have_one_winner() {
    let (_dir, engine) = new_engine();
    let engine = Arc::new(engine);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine
                    .create_record_store(&ns("db.shared"), &ident("shared"), &CollectionOptions::default())
                    .is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(engine.all_idents().unwrap(), vec![ident("shared")]);
}

#[test]
fn shared_store_counts_all_inserts() {
    let (_dir, engine) = new_engine();
    create_store(&engine, "db.shared", "shared");
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let store = engine
                    .get_record_store(&ns("db.shared"), &ident("shared"))
                    .unwrap();
                let mut ru = RecoveryUnit::new();
                for i in 0..10u8 {
                    store.insert_record(&mut ru, &[t as u8, i]).unwrap();
                }
                ru.commit_unit_of_work().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = engine
        .get_record_store(&ns("db.shared"), &ident("shared"))
        .unwrap();
    assert_eq!(store.num_records(), (THREADS * 10) as u64);
    assert_eq!(store.data_size(), (THREADS * 10 * 2) as u64);
    assert_eq!(engine.open_pool_count(), 1);
}
