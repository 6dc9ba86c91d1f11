//! Pool error type and its mapping into `PmseError`

use pmstore_core::{ObjectId, PmseError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Errors raised by [`PersistentPool`](crate::PersistentPool)
#[derive(Debug, Error)]
pub enum PoolError {
    /// I/O error on the pool file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `create` was called for a path that already exists
    #[error("Pool already exists at {path}")]
    AlreadyExists {
        /// Pool file path
        path: PathBuf,
    },

    /// `open` was called for a path with no pool file
    #[error("No pool at {path}")]
    NotFound {
        /// Pool file path
        path: PathBuf,
    },

    /// The pool cannot hold the requested data
    #[error("Pool {path} out of space: requested {requested} bytes, {available} available")]
    OutOfSpace {
        /// Pool file path
        path: PathBuf,
        /// Bytes the operation needed
        requested: u64,
        /// Bytes still free in the pool
        available: u64,
    },

    /// The pool file failed validation
    #[error("Pool corruption: {0}")]
    Corruption(String),

    /// The pool was created with a different layout name
    #[error("Layout mismatch: expected '{expected}', found '{found}'")]
    LayoutMismatch {
        /// Layout the caller asked for
        expected: String,
        /// Layout stamped in the file
        found: String,
    },

    /// The handle was closed
    #[error("Pool closed: {path}")]
    Closed {
        /// Pool file path
        path: PathBuf,
    },

    /// An object id does not refer to a live object
    #[error("No object {0} in pool")]
    MissingObject(ObjectId),

    /// A commit was abandoned before anything was written
    #[error("Transaction on {path} aborted: {reason}")]
    Aborted {
        /// Pool file path
        path: PathBuf,
        /// Why the new image could not be built
        reason: String,
    },

    /// Object encoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for PoolError {
    fn from(e: bincode::Error) -> Self {
        PoolError::Serialization(e.to_string())
    }
}

impl From<PoolError> for PmseError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Io(e) => PmseError::Io(e),
            PoolError::AlreadyExists { path } => PmseError::AlreadyExists {
                ident: path.display().to_string(),
            },
            PoolError::NotFound { path } => {
                PmseError::not_found(format!("pool at {}", path.display()))
            }
            PoolError::OutOfSpace {
                path,
                requested,
                available,
            } => PmseError::OutOfSpace {
                ident: path.display().to_string(),
                requested,
                available,
            },
            PoolError::Closed { path } => PmseError::PoolClosed {
                path: path.display().to_string(),
            },
            PoolError::Aborted { reason, .. } => PmseError::TransactionAborted { reason },
            PoolError::Serialization(msg) => PmseError::Serialization(msg),
            other @ (PoolError::Corruption(_)
            | PoolError::LayoutMismatch { .. }
            | PoolError::MissingObject(_)) => PmseError::corruption(other.to_string()),
        }
    }
}
