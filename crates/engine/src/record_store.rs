//! Record store
//!
//! A [`RecordStore`] is the per-collection handle returned by the engine.
//! Record mutations go straight to the collection's [`RecordMap`] and hand a
//! [`Change`] to the caller's [`RecoveryUnit`], which later commits or undoes
//! them together with the rest of the unit of work.

use crate::change::Change;
use crate::record_map::RecordMap;
use crate::recovery_unit::RecoveryUnit;
use pmstore_core::{Ident, Namespace, PmseError, PmseResult, RecordId};
use std::sync::Arc;

/// Per-collection creation options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Pool size in bytes; the engine's sizing policy applies when unset
    pub pool_size: Option<u64>,
}

impl CollectionOptions {
    /// Options with an explicit pool size
    pub fn with_pool_size(size: u64) -> Self {
        CollectionOptions {
            pool_size: Some(size),
        }
    }
}

/// Handle to one collection's records
#[derive(Debug, Clone)]
pub struct RecordStore {
    ns: Namespace,
    ident: Ident,
    map: Arc<RecordMap>,
    needs_recovery_check: bool,
}

impl RecordStore {
    pub(crate) fn new(
        ns: Namespace,
        ident: Ident,
        map: Arc<RecordMap>,
        needs_recovery_check: bool,
    ) -> Self {
        RecordStore {
            ns,
            ident,
            map,
            needs_recovery_check,
        }
    }

    /// Collection namespace
    pub fn ns(&self) -> &Namespace {
        &self.ns
    }

    /// Collection ident
    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    /// Whether the engine started after an unclean shutdown
    ///
    /// Callers use this to run consistency repair before trusting counters
    /// or indexes of this collection.
    pub fn needs_recovery_check(&self) -> bool {
        self.needs_recovery_check
    }

    /// Underlying record map
    pub fn record_map(&self) -> &Arc<RecordMap> {
        &self.map
    }

    /// Insert a record as part of `ru`
    pub fn insert_record(&self, ru: &mut RecoveryUnit, data: &[u8]) -> PmseResult<RecordId> {
        let loc = self.map.insert(data)?;
        ru.register_change(Change::insert(self.map.clone(), loc));
        Ok(loc)
    }

    /// Delete the record at `loc` as part of `ru`
    ///
    /// # Errors
    /// Returns `NotFound` if there is no record at `loc`.
    pub fn delete_record(&self, ru: &mut RecoveryUnit, loc: RecordId) -> PmseResult<()> {
        let cached = self.map.remove(loc)?.ok_or_else(|| {
            PmseError::not_found(format!("record {} in '{}'", loc, self.ident))
        })?;
        ru.register_change(Change::remove(self.map.clone(), cached));
        Ok(())
    }

    /// Payload of the record at `loc`
    pub fn find_record(&self, loc: RecordId) -> PmseResult<Option<Vec<u8>>> {
        Ok(self.map.find(loc)?.map(|record| record.data))
    }

    /// Number of records
    pub fn num_records(&self) -> u64 {
        self.map.len()
    }

    /// Total payload bytes
    pub fn data_size(&self) -> u64 {
        self.map.data_size()
    }
}
