//! Error types for pmstore
//!
//! Every structural operation returns a [`PmseResult`]. The variants follow
//! the failure classes the engine distinguishes:
//!
//! - space exhaustion while creating or growing a pool
//! - a requested ident or index entry that does not exist
//! - transient I/O or transaction failures
//! - fatal initialization failures (the engine refuses to start)
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for pmstore operations
pub type PmseResult<T> = std::result::Result<T, PmseError>;

/// Unified error type for the pool registry, catalog and change log
#[derive(Debug, Error)]
pub enum PmseError {
    /// Not enough room in the backing pool for the requested allocation
    #[error("Out of space in '{ident}': requested {requested} bytes, {available} available")]
    OutOfSpace {
        /// Pool (ident or path) that ran out of space
        ident: String,
        /// Bytes the operation needed
        requested: u64,
        /// Bytes the pool could still provide
        available: u64,
    },

    /// An ident, index entry or record does not exist
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing item
        what: String,
    },

    /// An ident or index name is already registered
    #[error("Already exists: {ident}")]
    AlreadyExists {
        /// The conflicting name
        ident: String,
    },

    /// An ident cannot be used as a pool or index name
    #[error("Invalid ident '{ident}': {reason}")]
    InvalidIdent {
        /// The rejected ident
        ident: String,
        /// Why it was rejected
        reason: String,
    },

    /// A unique sorted index already holds the key
    #[error("Duplicate key in index '{ident}'")]
    DuplicateKey {
        /// Index ident
        ident: String,
    },

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Persistent data failed validation
    #[error("Data corruption: {message}")]
    Corruption {
        /// Details of what failed validation
        message: String,
    },

    /// Operation attempted on a pool handle that was already closed
    #[error("Pool closed: {path}")]
    PoolClosed {
        /// Path of the closed pool
        path: String,
    },

    /// A pool transaction was aborted and nothing was applied
    #[error("Transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort
        reason: String,
    },

    /// The engine cannot start
    #[error("Fatal initialization failure: {message}")]
    FatalInit {
        /// What went wrong during startup
        message: String,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Details of the configuration problem
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PmseError {
    /// Create a `NotFound` error
    pub fn not_found(what: impl Into<String>) -> Self {
        PmseError::NotFound { what: what.into() }
    }

    /// Create an `AlreadyExists` error
    pub fn already_exists(ident: impl Into<String>) -> Self {
        PmseError::AlreadyExists {
            ident: ident.into(),
        }
    }

    /// Create an `InvalidIdent` error
    pub fn invalid_ident(ident: impl Into<String>, reason: impl Into<String>) -> Self {
        PmseError::InvalidIdent {
            ident: ident.into(),
            reason: reason.into(),
        }
    }

    /// Create a `Corruption` error
    pub fn corruption(message: impl Into<String>) -> Self {
        PmseError::Corruption {
            message: message.into(),
        }
    }

    /// Create a `FatalInit` error
    pub fn fatal_init(message: impl Into<String>) -> Self {
        PmseError::FatalInit {
            message: message.into(),
        }
    }

    /// Create a `Config` error
    pub fn config(message: impl Into<String>) -> Self {
        PmseError::Config {
            message: message.into(),
        }
    }

    /// Check if this is a space exhaustion error
    pub fn is_out_of_space(&self) -> bool {
        matches!(self, PmseError::OutOfSpace { .. })
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, PmseError::NotFound { .. })
    }

    /// Check if this error means the engine must not start
    pub fn is_fatal(&self) -> bool {
        matches!(self, PmseError::FatalInit { .. })
    }
}

impl From<bincode::Error> for PmseError {
    fn from(e: bincode::Error) -> Self {
        PmseError::Serialization(e.to_string())
    }
}
