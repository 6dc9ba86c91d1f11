//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Once;

pub use pmstore::{
    CollectionOptions, Engine, EngineConfig, Ident, IndexDescriptor, Namespace, PmseError,
    RecordId, RecoveryUnit,
};
pub use tempfile::TempDir;

static INIT_TRACING: Once = Once::new();

/// Route engine logs to the test harness output.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Test configuration: minimum-size pools, no fsync.
pub fn test_config() -> EngineConfig {
    EngineConfig::for_testing()
}

/// Open an engine on `path` with the test configuration.
pub fn open_engine(path: &Path) -> Engine {
    init_tracing();
    Engine::open_with_config(path, test_config()).expect("Failed to open engine")
}

/// Fresh temp directory plus an engine opened on it.
pub fn new_engine() -> (TempDir, Engine) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let engine = open_engine(dir.path());
    (dir, engine)
}

pub fn ident(name: &str) -> Ident {
    Ident::new(name).expect("valid ident")
}

pub fn ns(name: &str) -> Namespace {
    Namespace::new(name)
}

/// Create a record store with default options.
pub fn create_store(engine: &Engine, namespace: &str, name: &str) -> pmstore::RecordStore {
    engine
        .create_record_store(&ns(namespace), &ident(name), &CollectionOptions::default())
        .expect("Failed to create record store")
}

/// Insert `payloads` and commit them as one unit of work.
pub fn insert_committed(store: &pmstore::RecordStore, payloads: &[&[u8]]) -> Vec<RecordId> {
    let mut ru = RecoveryUnit::new();
    let ids = payloads
        .iter()
        .map(|payload| store.insert_record(&mut ru, payload).expect("insert"))
        .collect();
    ru.commit_unit_of_work().expect("commit");
    ids
}

/// Copy the files of a live storage directory, as a power loss would
/// leave them.
///
/// Every committed pool transaction is already on disk, so the copy is
/// exactly what the next process would find after a crash.
pub fn crash_image(src: &Path) -> TempDir {
    let dst = TempDir::new().expect("Failed to create temp dir");
    for entry in fs::read_dir(src).expect("read storage dir") {
        let entry = entry.expect("dir entry");
        if entry.file_type().expect("file type").is_file() {
            fs::copy(entry.path(), dst.path().join(entry.file_name())).expect("copy pool file");
        }
    }
    dst
}
