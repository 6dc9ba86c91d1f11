//! Open pool registry
//!
//! Maps each collection ident to its open pool handle. The engine guards the
//! registry with a single mutex that is held for every structural operation,
//! and it is the only place pool handles are closed.

use crate::record_map::RecordMap;
use pmstore_core::Ident;
use pmstore_storage::PersistentPool;
use std::collections::HashMap;
use std::sync::Arc;

/// How a pool handle was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoolOrigin {
    /// Already open in the registry
    Registered,
    /// Opened from an existing file
    Opened,
    /// Newly created file
    Created,
}

/// One open collection pool
pub(crate) struct PoolEntry {
    pub(crate) pool: PersistentPool,
    /// Record map shared by every record store handle of the collection
    pub(crate) records: Option<Arc<RecordMap>>,
}

#[derive(Default)]
pub(crate) struct PoolRegistry {
    pools: HashMap<Ident, PoolEntry>,
}

impl PoolRegistry {
    pub(crate) fn get(&self, ident: &Ident) -> Option<&PoolEntry> {
        self.pools.get(ident)
    }

    pub(crate) fn get_mut(&mut self, ident: &Ident) -> Option<&mut PoolEntry> {
        self.pools.get_mut(ident)
    }

    pub(crate) fn insert(&mut self, ident: Ident, pool: PersistentPool) {
        self.pools.insert(
            ident,
            PoolEntry {
                pool,
                records: None,
            },
        );
    }

    pub(crate) fn remove(&mut self, ident: &Ident) -> Option<PoolEntry> {
        self.pools.remove(ident)
    }

    /// Handles of every registered pool
    pub(crate) fn pools(&self) -> Vec<(Ident, PersistentPool)> {
        self.pools
            .iter()
            .map(|(ident, entry)| (ident.clone(), entry.pool.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pools.len()
    }

    /// Take every entry out, leaving the registry empty
    pub(crate) fn drain(&mut self) -> Vec<(Ident, PoolEntry)> {
        self.pools.drain().collect()
    }
}
