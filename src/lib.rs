//! pmstore - persistent pool registry and crash-safe catalog for a document
//! storage engine
//!
//! pmstore keeps every collection of a storage directory in its own
//! persistent pool and tracks them in a catalog that survives crashes.
//!
//! # Quick Start
//!
//! ```ignore
//! use pmstore::{CollectionOptions, Engine, Ident, RecoveryUnit};
//!
//! let engine = Engine::open("/path/to/data")?;
//! let ident = Ident::new("collection-0")?;
//! let store = engine.create_record_store(&"shop.orders".into(), &ident, &CollectionOptions::default())?;
//!
//! let mut ru = RecoveryUnit::new();
//! let loc = store.insert_record(&mut ru, b"order #1")?;
//! ru.commit_unit_of_work()?;
//!
//! assert_eq!(store.find_record(loc)?, Some(b"order #1".to_vec()));
//! engine.clean_shutdown()?;
//! ```
//!
//! # Architecture
//!
//! - `pmstore-core`: shared types, errors and limits
//! - `pmstore-storage`: the persistent pool primitive
//! - `pmstore-engine`: catalog, record stores, indexes and the engine

pub use pmstore_core::{
    Ident, Namespace, ObjectId, PmseError, PmseResult, RecordId, IDENT_NAME_CAPACITY, MIN_POOL_SIZE,
};
pub use pmstore_engine::*;
pub use pmstore_storage::{PersistentPool, PoolError, PoolOptions};
