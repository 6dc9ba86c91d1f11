//! Change objects
//!
//! A [`Change`] records one record-map mutation made on behalf of an
//! enclosing unit of work so that the unit can later finalize it.
//!
//! | Variant | `commit` | `rollback` |
//! |---------|----------|------------|
//! | `Insert` | nothing to do | remove the inserted record (no-op if already gone) |
//! | `Remove` | release the cached payload | put the cached record back |
//!
//! Both finalizers take `self`, so a change is finalized at most once; the
//! [`RecoveryUnit`](crate::RecoveryUnit) guarantees it is finalized exactly
//! once.

use crate::record_map::{Record, RecordMap};
use pmstore_core::{PmseResult, RecordId};
use std::sync::Arc;
use tracing::debug;

/// Pending mutation of a record map
#[derive(Debug)]
pub enum Change {
    /// A record was inserted at `loc`
    Insert {
        /// Map the record was inserted into
        map: Arc<RecordMap>,
        /// Location of the new record
        loc: RecordId,
    },
    /// A record was removed; `cached` holds its pre-removal contents
    Remove {
        /// Map the record was removed from
        map: Arc<RecordMap>,
        /// Shadow copy used to restore the record
        cached: Record,
    },
}

impl Change {
    /// Change for a record just inserted at `loc`
    pub fn insert(map: Arc<RecordMap>, loc: RecordId) -> Self {
        Change::Insert { map, loc }
    }

    /// Change for a record just removed
    pub fn remove(map: Arc<RecordMap>, cached: Record) -> Self {
        Change::Remove { map, cached }
    }

    /// Location the change applies to
    pub fn loc(&self) -> RecordId {
        match self {
            Change::Insert { loc, .. } => *loc,
            Change::Remove { cached, .. } => cached.id,
        }
    }

    /// Finalize the mutation
    pub fn commit(self) -> PmseResult<()> {
        match self {
            Change::Insert { .. } => {}
            Change::Remove { cached, .. } => {
                debug!(target: "pmstore::engine", id = %cached.id, bytes = cached.data.len(), "Cached record released");
                drop(cached);
            }
        }
        Ok(())
    }

    /// Undo the mutation
    pub fn rollback(self) -> PmseResult<()> {
        match self {
            Change::Insert { map, loc } => {
                if map.remove(loc)?.is_none() {
                    debug!(target: "pmstore::engine", id = %loc, "Inserted record already gone");
                }
                Ok(())
            }
            Change::Remove { map, cached } => map.restore(&cached),
        }
    }
}
