//! Core types for pmstore
//!
//! This crate defines the foundational types shared by the storage and
//! engine layers:
//! - Ident, Namespace: catalog naming
//! - RecordId, ObjectId: record and arena object identity
//! - PmseError / PmseResult: error type hierarchy
//! - Limits: pool sizing defaults and reserved names

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod types;

pub use error::{PmseError, PmseResult};
pub use limits::{
    DEFAULT_IDENT_LIST_POOL_SIZE, DEFAULT_SYSTEM_POOL_SIZE, DEFAULT_USER_POOL_SIZE,
    IDENT_LIST_FILENAME, IDENT_LIST_LAYOUT, IDENT_NAME_CAPACITY, MAPPER_LAYOUT, MIN_POOL_SIZE,
};
pub use types::{Ident, Namespace, ObjectId, RecordId};
