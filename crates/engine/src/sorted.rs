//! Sorted data interface
//!
//! A [`SortedDataInterface`] is one secondary index bound to a persistent
//! tree root inside its collection's pool. The tree holds `(key, RecordId)`
//! entries in key order; a unique index admits at most one location per key.

use pmstore_core::{Ident, Namespace, ObjectId, PmseError, PmseResult, RecordId};
use pmstore_storage::PersistentPool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Static description of an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name as seen by users
    pub name: String,
    /// Namespace of the collection the index belongs to
    pub parent_ns: Namespace,
    /// Reject a second location for the same key
    pub unique: bool,
}

impl IndexDescriptor {
    /// Non-unique index on `parent_ns`
    pub fn new(name: impl Into<String>, parent_ns: impl Into<Namespace>) -> Self {
        IndexDescriptor {
            name: name.into(),
            parent_ns: parent_ns.into(),
            unique: false,
        }
    }

    /// Set uniqueness
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct TreeRoot {
    entries: BTreeSet<(Vec<u8>, RecordId)>,
}

/// Handle to one index tree
#[derive(Debug, Clone)]
pub struct SortedDataInterface {
    ident: Ident,
    descriptor: IndexDescriptor,
    pool: PersistentPool,
    tree: ObjectId,
}

impl SortedDataInterface {
    pub(crate) fn new(
        ident: Ident,
        descriptor: IndexDescriptor,
        pool: PersistentPool,
        tree: ObjectId,
    ) -> Self {
        SortedDataInterface {
            ident,
            descriptor,
            pool,
            tree,
        }
    }

    /// Index ident
    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    /// Index descriptor
    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    /// Tree root this handle is bound to
    pub fn tree_root(&self) -> ObjectId {
        self.tree
    }

    /// Add `key → loc`
    ///
    /// Inserting an entry that is already present is a no-op.
    ///
    /// # Errors
    /// Returns `DuplicateKey` if the index is unique and `key` already maps
    /// to another location.
    pub fn insert(&self, key: &[u8], loc: RecordId) -> PmseResult<()> {
        self.pool.transaction(|tx| -> PmseResult<()> {
            let mut tree: TreeRoot = tx.read(self.tree)?;
            if self.descriptor.unique && locations(&tree, key).any(|existing| existing != loc) {
                return Err(PmseError::DuplicateKey {
                    ident: self.ident.to_string(),
                });
            }
            if tree.entries.insert((key.to_vec(), loc)) {
                tx.write(self.tree, &tree)?;
            }
            Ok(())
        })
    }

    /// Remove `key → loc`; returns whether it was present
    pub fn remove(&self, key: &[u8], loc: RecordId) -> PmseResult<bool> {
        self.pool.transaction(|tx| -> PmseResult<bool> {
            let mut tree: TreeRoot = tx.read(self.tree)?;
            let removed = tree.entries.remove(&(key.to_vec(), loc));
            if removed {
                tx.write(self.tree, &tree)?;
            }
            Ok(removed)
        })
    }

    /// Locations stored under `key`, ascending
    pub fn find(&self, key: &[u8]) -> PmseResult<Vec<RecordId>> {
        let tree: TreeRoot = self.pool.read(self.tree)?;
        Ok(locations(&tree, key).collect())
    }

    /// Number of entries
    pub fn len(&self) -> PmseResult<usize> {
        let tree: TreeRoot = self.pool.read(self.tree)?;
        Ok(tree.entries.len())
    }

    /// Check if the index has no entries
    pub fn is_empty(&self) -> PmseResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn locations<'t>(tree: &'t TreeRoot, key: &'t [u8]) -> impl Iterator<Item = RecordId> + 't {
    tree.entries
        .range((key.to_vec(), RecordId::new(0))..)
        .take_while(move |(k, _)| k.as_slice() == key)
        .map(|(_, loc)| *loc)
}
