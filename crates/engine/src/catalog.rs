//! Ident catalog
//!
//! The ident catalog lives in its own pool (the ident-list pool) and maps
//! every collection and index ident to its namespace. It also carries the
//! safe-shutdown marker used to detect crashes.
//!
//! ## Persistent layout
//!
//! ```text
//! pool root ──► IdentListRoot { list }
//!                               │
//!                               ▼
//!               CatalogList { head, tail, len, safe_shutdown }
//!                               │
//!                               ▼
//!               CatalogNode { ident, ns, next } ──► CatalogNode ──► ...
//! ```
//!
//! Nodes are kept in insertion order. Every mutation is one pool transaction,
//! and reads run inside an empty transaction so a traversal never observes a
//! half-applied change.

use pmstore_core::{Ident, Namespace, ObjectId, PmseError, PmseResult};
use pmstore_storage::{PersistentPool, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentListRoot {
    list: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogList {
    head: Option<ObjectId>,
    tail: Option<ObjectId>,
    len: u64,
    safe_shutdown: bool,
}

impl CatalogList {
    /// A fresh catalog has no previous instance to recover from.
    fn fresh() -> Self {
        CatalogList {
            head: None,
            tail: None,
            len: 0,
            safe_shutdown: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogNode {
    ident: Ident,
    ns: Namespace,
    next: Option<ObjectId>,
}

/// Persistent ident → namespace directory plus safe-shutdown marker
pub struct IdentCatalog {
    pool: PersistentPool,
    list: ObjectId,
}

impl IdentCatalog {
    /// Bind to the catalog in `pool`, creating it if the pool is fresh.
    ///
    /// Root and list are created together in one transaction.
    pub fn initialize(pool: PersistentPool) -> PmseResult<Self> {
        let list = match pool.root::<IdentListRoot>()? {
            Some(root) => root.list,
            None => {
                let list = pool.transaction(|tx| -> PmseResult<ObjectId> {
                    let list = tx.alloc(&CatalogList::fresh())?;
                    let root = tx.alloc(&IdentListRoot { list })?;
                    tx.set_root(Some(root))?;
                    Ok(list)
                })?;
                info!(target: "pmstore::catalog", path = %pool.path().display(), "Ident catalog created");
                list
            }
        };
        Ok(IdentCatalog { pool, list })
    }

    /// The ident-list pool
    pub fn pool(&self) -> &PersistentPool {
        &self.pool
    }

    /// Register `ident` under `ns`
    ///
    /// # Errors
    /// Returns `AlreadyExists` if `ident` is already registered.
    pub fn insert_kv(&self, ident: &Ident, ns: &Namespace) -> PmseResult<()> {
        self.pool.transaction(|tx| -> PmseResult<()> {
            let list: CatalogList = tx.read(self.list)?;
            if find_node(tx, &list, ident)?.is_some() {
                return Err(PmseError::already_exists(ident.as_str()));
            }
            append(tx, self.list, list, ident, ns)
        })?;
        debug!(target: "pmstore::catalog", %ident, %ns, "Catalog entry inserted");
        Ok(())
    }

    /// Set the namespace of `ident`, registering it if absent
    pub fn update(&self, ident: &Ident, ns: &Namespace) -> PmseResult<()> {
        self.pool.transaction(|tx| -> PmseResult<()> {
            let list: CatalogList = tx.read(self.list)?;
            match find_node(tx, &list, ident)? {
                Some(found) if found.node.ns == *ns => Ok(()),
                Some(found) => {
                    let node = CatalogNode {
                        ns: ns.clone(),
                        ..found.node
                    };
                    tx.write(found.id, &node)?;
                    Ok(())
                }
                None => append(tx, self.list, list, ident, ns),
            }
        })
    }

    /// Remove `ident`; returns whether it was present
    pub fn delete_kv(&self, ident: &Ident) -> PmseResult<bool> {
        let removed = self.pool.transaction(|tx| -> PmseResult<bool> {
            let mut list: CatalogList = tx.read(self.list)?;
            let found = match find_node(tx, &list, ident)? {
                Some(found) => found,
                None => return Ok(false),
            };

            match found.prev {
                Some(prev_id) => {
                    let mut prev: CatalogNode = tx.read(prev_id)?;
                    prev.next = found.node.next;
                    tx.write(prev_id, &prev)?;
                }
                None => list.head = found.node.next,
            }
            if list.tail == Some(found.id) {
                list.tail = found.prev;
            }
            list.len -= 1;
            tx.write(self.list, &list)?;
            tx.free(found.id)?;
            Ok(true)
        })?;
        if removed {
            debug!(target: "pmstore::catalog", %ident, "Catalog entry removed");
        }
        Ok(removed)
    }

    /// Namespace registered for `ident`
    pub fn get(&self, ident: &Ident) -> PmseResult<Option<Namespace>> {
        self.pool.transaction(|tx| -> PmseResult<Option<Namespace>> {
            let list: CatalogList = tx.read(self.list)?;
            Ok(find_node(tx, &list, ident)?.map(|found| found.node.ns))
        })
    }

    /// Check if `ident` is registered
    pub fn contains(&self, ident: &Ident) -> PmseResult<bool> {
        Ok(self.get(ident)?.is_some())
    }

    /// First ident (in insertion order) registered under `ns`
    pub fn find_first_value(&self, ns: &Namespace) -> PmseResult<Option<Ident>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|(_, entry_ns)| entry_ns == ns)
            .map(|(ident, _)| ident))
    }

    /// All (ident, namespace) pairs in insertion order
    pub fn entries(&self) -> PmseResult<Vec<(Ident, Namespace)>> {
        self.pool.transaction(|tx| -> PmseResult<Vec<(Ident, Namespace)>> {
            let list: CatalogList = tx.read(self.list)?;
            let mut entries = Vec::with_capacity(list.len as usize);
            let mut cursor = list.head;
            while let Some(id) = cursor {
                let node: CatalogNode = tx.read(id)?;
                cursor = node.next;
                entries.push((node.ident, node.ns));
            }
            Ok(entries)
        })
    }

    /// Number of registered idents
    pub fn len(&self) -> PmseResult<usize> {
        Ok(self.read_list()?.len as usize)
    }

    /// Check if no ident is registered
    pub fn is_empty(&self) -> PmseResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether the previous instance marked a clean shutdown
    pub fn is_after_safe_shutdown(&self) -> PmseResult<bool> {
        Ok(self.read_list()?.safe_shutdown)
    }

    /// Mark the current instance as running (not safely shut down)
    pub fn reset_state(&self) -> PmseResult<()> {
        self.set_safe_shutdown(false)
    }

    /// Mark a clean shutdown
    pub fn mark_safe_shutdown(&self) -> PmseResult<()> {
        self.set_safe_shutdown(true)
    }

    fn set_safe_shutdown(&self, safe: bool) -> PmseResult<()> {
        self.pool.transaction(|tx| -> PmseResult<()> {
            let mut list: CatalogList = tx.read(self.list)?;
            if list.safe_shutdown != safe {
                list.safe_shutdown = safe;
                tx.write(self.list, &list)?;
            }
            Ok(())
        })
    }

    fn read_list(&self) -> PmseResult<CatalogList> {
        Ok(self.pool.read(self.list)?)
    }
}

impl std::fmt::Debug for IdentCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentCatalog")
            .field("pool", &self.pool)
            .field("list", &self.list)
            .finish()
    }
}

struct FoundNode {
    prev: Option<ObjectId>,
    id: ObjectId,
    node: CatalogNode,
}

fn find_node(
    tx: &Transaction<'_>,
    list: &CatalogList,
    ident: &Ident,
) -> PmseResult<Option<FoundNode>> {
    let mut prev = None;
    let mut cursor = list.head;
    while let Some(id) = cursor {
        let node: CatalogNode = tx.read(id)?;
        if node.ident == *ident {
            return Ok(Some(FoundNode { prev, id, node }));
        }
        prev = Some(id);
        cursor = node.next;
    }
    Ok(None)
}

fn append(
    tx: &mut Transaction<'_>,
    list_id: ObjectId,
    mut list: CatalogList,
    ident: &Ident,
    ns: &Namespace,
) -> PmseResult<()> {
    let id = tx.alloc(&CatalogNode {
        ident: ident.clone(),
        ns: ns.clone(),
        next: None,
    })?;
    match list.tail {
        Some(tail_id) => {
            let mut tail: CatalogNode = tx.read(tail_id)?;
            tail.next = Some(id);
            tx.write(tail_id, &tail)?;
        }
        None => list.head = Some(id),
    }
    list.tail = Some(id);
    list.len += 1;
    tx.write(list_id, &list)?;
    Ok(())
}
