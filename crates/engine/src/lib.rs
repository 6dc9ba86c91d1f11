//! Storage engine control plane for pmstore
//!
//! This crate manages the persistent pools of one storage directory:
//! - Engine: pool registry with create/get/drop of record stores and
//!   sorted data interfaces, startup recovery flag, clean shutdown
//! - IdentCatalog: persistent ident → namespace directory with the
//!   safe-shutdown marker
//! - IndexCatalog: per-collection list of index trees
//! - RecordMap / RecordStore: records of one collection
//! - SortedDataInterface: one secondary index
//! - Change / RecoveryUnit: commit or undo record mutations with the
//!   enclosing unit of work
//!
//! The engine is the only component that opens and closes pools.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod change;
mod collection;
pub mod database;
pub mod index_catalog;
pub mod record_map;
pub mod record_store;
pub mod recovery_unit;
pub mod sorted;

pub use catalog::IdentCatalog;
pub use change::Change;
pub use database::{Engine, EngineConfig, CONFIG_FILE_NAME, LOCK_FILE_NAME};
pub use index_catalog::IndexCatalog;
pub use record_map::{Record, RecordMap};
pub use record_store::{CollectionOptions, RecordStore};
pub use recovery_unit::{FinalizeStats, RecoveryUnit};
pub use sorted::{IndexDescriptor, SortedDataInterface};
