//! Per-collection index catalog
//!
//! Indexes of a collection live in the collection's own pool as a singly
//! linked list hanging off the [`CollectionRoot`]:
//!
//! ```text
//! CollectionRoot { record_map, index_head }
//!                                  │
//!                                  ▼
//!                 IndexNode { name, tree, next } ──► IndexNode ──► ...
//! ```
//!
//! New nodes are linked at the head. Tree allocation, node allocation and the
//! head update happen in one pool transaction, so the list is never observed
//! partially linked.

use crate::collection::CollectionRoot;
use crate::sorted::TreeRoot;
use pmstore_core::{Ident, ObjectId, PmseError, PmseResult, IDENT_NAME_CAPACITY};
use pmstore_storage::{PersistentPool, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexNode {
    name: String,
    tree: ObjectId,
    next: Option<ObjectId>,
}

/// Index list of one collection pool
#[derive(Debug, Clone)]
pub struct IndexCatalog {
    pool: PersistentPool,
}

impl IndexCatalog {
    /// Bind to the index list of `pool`
    pub fn new(pool: PersistentPool) -> Self {
        IndexCatalog { pool }
    }

    /// Allocate a tree for `name` and link its node at the head
    ///
    /// Returns the new tree root.
    ///
    /// # Errors
    /// - `InvalidIdent` if `name` does not fit the node's name buffer
    /// - `AlreadyExists` if the list already has a node named `name`
    /// - `OutOfSpace` if the pool cannot hold the new tree; the list is unchanged
    pub fn create(&self, name: &Ident) -> PmseResult<ObjectId> {
        if name.as_str().len() > IDENT_NAME_CAPACITY {
            return Err(PmseError::invalid_ident(
                name.as_str(),
                format!("index names are limited to {} bytes", IDENT_NAME_CAPACITY),
            ));
        }

        let tree = self.pool.transaction(|tx| -> PmseResult<ObjectId> {
            let (root_id, mut root) = collection_root(tx)?;
            if find_node(tx, &root, name.as_str())?.is_some() {
                return Err(PmseError::already_exists(name.as_str()));
            }
            let tree = tx.alloc(&TreeRoot::default())?;
            let node = tx.alloc(&IndexNode {
                name: name.to_string(),
                tree,
                next: root.index_head,
            })?;
            root.index_head = Some(node);
            tx.write(root_id, &root)?;
            Ok(tree)
        })?;

        debug!(target: "pmstore::catalog", index = %name, tree = %tree, "Index node linked");
        Ok(tree)
    }

    /// Tree root of the first node named `name`, scanning from the head
    pub fn find(&self, name: &Ident) -> PmseResult<Option<ObjectId>> {
        self.pool.transaction(|tx| -> PmseResult<Option<ObjectId>> {
            let (_, root) = collection_root(tx)?;
            Ok(find_node(tx, &root, name.as_str())?.map(|found| found.node.tree))
        })
    }

    /// Unlink the node named `name` and free its tree
    ///
    /// Returns whether a node was removed.
    pub fn remove(&self, name: &Ident) -> PmseResult<bool> {
        let removed = self.pool.transaction(|tx| -> PmseResult<bool> {
            let (root_id, mut root) = collection_root(tx)?;
            let found = match find_node(tx, &root, name.as_str())? {
                Some(found) => found,
                None => return Ok(false),
            };
            match found.prev {
                Some(prev_id) => {
                    let mut prev: IndexNode = tx.read(prev_id)?;
                    prev.next = found.node.next;
                    tx.write(prev_id, &prev)?;
                }
                None => {
                    root.index_head = found.node.next;
                    tx.write(root_id, &root)?;
                }
            }
            tx.free(found.node.tree)?;
            tx.free(found.id)?;
            Ok(true)
        })?;
        if removed {
            debug!(target: "pmstore::catalog", index = %name, "Index node unlinked");
        }
        Ok(removed)
    }

    /// Index names from head to tail (most recent first)
    pub fn names(&self) -> PmseResult<Vec<String>> {
        self.pool.transaction(|tx| -> PmseResult<Vec<String>> {
            let (_, root) = collection_root(tx)?;
            let mut names = Vec::new();
            let mut cursor = root.index_head;
            while let Some(id) = cursor {
                let node: IndexNode = tx.read(id)?;
                cursor = node.next;
                names.push(node.name);
            }
            Ok(names)
        })
    }
}

struct FoundNode {
    prev: Option<ObjectId>,
    id: ObjectId,
    node: IndexNode,
}

fn collection_root(tx: &Transaction<'_>) -> PmseResult<(ObjectId, CollectionRoot)> {
    let root_id = tx
        .root_id()
        .ok_or_else(|| PmseError::corruption("collection pool has no root"))?;
    Ok((root_id, tx.read(root_id)?))
}

fn find_node(
    tx: &Transaction<'_>,
    root: &CollectionRoot,
    name: &str,
) -> PmseResult<Option<FoundNode>> {
    let mut prev = None;
    let mut cursor = root.index_head;
    while let Some(id) = cursor {
        let node: IndexNode = tx.read(id)?;
        if node.name == name {
            return Ok(Some(FoundNode { prev, id, node }));
        }
        prev = Some(id);
        cursor = node.next;
    }
    Ok(None)
}
