//! Collection pool root
//!
//! Every collection pool is rooted at a [`CollectionRoot`] holding the record
//! map root and the head of the pool's index list.

use crate::record_map::RecordMap;
use pmstore_core::{ObjectId, PmseResult};
use pmstore_storage::PersistentPool;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionRoot {
    pub(crate) record_map: ObjectId,
    pub(crate) index_head: Option<ObjectId>,
}

impl CollectionRoot {
    /// Read the root of `pool`, creating root and empty record map in one
    /// transaction if the pool is fresh.
    pub(crate) fn ensure(pool: &PersistentPool) -> PmseResult<CollectionRoot> {
        if let Some(root) = pool.root::<CollectionRoot>()? {
            return Ok(root);
        }
        let root = pool.transaction(|tx| -> PmseResult<CollectionRoot> {
            let root = CollectionRoot {
                record_map: RecordMap::create(tx)?,
                index_head: None,
            };
            let id = tx.alloc(&root)?;
            tx.set_root(Some(id))?;
            Ok(root)
        })?;
        debug!(target: "pmstore::engine", path = %pool.path().display(), "Collection root created");
        Ok(root)
    }
}
