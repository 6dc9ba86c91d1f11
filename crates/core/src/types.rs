//! Core types for pmstore
//!
//! This module defines the foundational types:
//! - Ident: on-disk name of one collection or index
//! - Namespace: "db.collection" name an ident is registered under
//! - RecordId: identity of a record inside a collection's record map
//! - ObjectId: stable key of an object inside a persistent pool arena

use crate::error::{PmseError, PmseResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable string identifier for one collection or index
///
/// An ident doubles as the file name of the collection's pool, so it must
/// be a single, non-empty path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ident(String);

impl Ident {
    /// Create a validated ident
    ///
    /// # Errors
    /// Returns `InvalidIdent` if the name is empty, is `.`/`..`, or contains
    /// a path separator or NUL byte.
    pub fn new(name: impl Into<String>) -> PmseResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PmseError::invalid_ident(name, "ident is empty"));
        }
        if name == "." || name == ".." {
            return Err(PmseError::invalid_ident(name, "ident is a relative path"));
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(PmseError::invalid_ident(
                name,
                "contains a path separator or NUL byte",
            ));
        }
        Ok(Ident(name))
    }

    /// Get the ident as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Ident {
    type Error = PmseError;

    fn try_from(value: &str) -> PmseResult<Self> {
        Ident::new(value)
    }
}

/// Fully qualified collection name: `db.collection`
///
/// The empty namespace is used as a placeholder for index idents in the
/// ident catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(String);

/// Databases whose collections are internal to the server
const SYSTEM_DATABASES: &[&str] = &["admin", "local", "config"];

impl Namespace {
    /// Create a namespace from its dotted form
    pub fn new(ns: impl Into<String>) -> Self {
        Namespace(ns.into())
    }

    /// The empty placeholder namespace
    pub fn empty() -> Self {
        Namespace(String::new())
    }

    /// Check if this is the placeholder namespace
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Database part (before the first dot)
    pub fn db(&self) -> &str {
        match self.0.split_once('.') {
            Some((db, _)) => db,
            None => &self.0,
        }
    }

    /// Collection part (after the first dot), empty if there is none
    pub fn coll(&self) -> &str {
        match self.0.split_once('.') {
            Some((_, coll)) => coll,
            None => "",
        }
    }

    /// Check if this names an internal collection
    ///
    /// `system.*` collections and every collection in `admin`, `local` and
    /// `config` get the smaller pool size.
    pub fn is_system(&self) -> bool {
        self.coll().starts_with("system.") || SYSTEM_DATABASES.contains(&self.db())
    }

    /// Get the namespace as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(value: &str) -> Self {
        Namespace::new(value)
    }
}

/// Identity of a record within one record map
///
/// Record ids are allocated monotonically per map starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(u64);

impl RecordId {
    /// Create a record id from its raw value
    pub const fn new(id: u64) -> Self {
        RecordId(id)
    }

    /// Raw value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

/// Stable key of an object in a pool arena
///
/// Zero is reserved as the on-disk null pointer and never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Create an object id from its raw value
    pub const fn new(id: u64) -> Self {
        ObjectId(id)
    }

    /// Raw value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
