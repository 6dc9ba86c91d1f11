//! Persistent pool layer for pmstore
//!
//! This crate implements the pool primitive the engine is built on:
//! - PersistentPool: fixed-capacity, file-backed object arena with a root table
//! - Transaction: all-or-nothing staging of allocations, writes and frees
//! - format: the checksummed pool image written on every commit
//!
//! Objects are stored as `bincode`-encoded `serde` values and addressed by
//! stable [`ObjectId`](pmstore_core::ObjectId)s, so pointer fields in
//! persistent structures are plain ids into the owning pool.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod format;
pub mod pool;
pub mod transaction;

pub use error::{PoolError, PoolResult};
pub use pool::{PersistentPool, PoolOptions, SCRATCH_SUFFIX};
pub use transaction::Transaction;
