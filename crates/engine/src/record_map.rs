//! Persistent record map
//!
//! Each collection pool holds one map root that owns every record payload in
//! the pool. Payloads are separate pool objects; the root keeps the
//! `RecordId → object` index together with the record count and data size,
//! and every mutation rewrites root and payload in one pool transaction.
//!
//! The counters are also cached in memory so `len()`/`data_size()` do not
//! touch the pool. The cache is updated under its own lock together with the
//! transaction that changed the map, so it never double counts a mutation.
//! [`RecordMap::store_counters`] reconciles the cache and the persisted
//! counters with what the map actually holds.

use parking_lot::Mutex;
use pmstore_core::{ObjectId, PmseError, PmseResult, RecordId};
use pmstore_storage::{PersistentPool, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One record: its location and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Location of the record in its map
    pub id: RecordId,
    /// Record payload
    pub data: Vec<u8>,
}

impl Record {
    /// Create a record
    pub fn new(id: RecordId, data: impl Into<Vec<u8>>) -> Self {
        Record {
            id,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RecordSlot {
    object: ObjectId,
    len: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MapRoot {
    next_id: u64,
    records: BTreeMap<RecordId, RecordSlot>,
    record_count: u64,
    data_size: u64,
}

impl Default for MapRoot {
    fn default() -> Self {
        MapRoot {
            next_id: 1,
            records: BTreeMap::new(),
            record_count: 0,
            data_size: 0,
        }
    }
}

impl MapRoot {
    fn recount(&self) -> (u64, u64) {
        let count = self.records.len() as u64;
        let size = self.records.values().map(|slot| slot.len).sum();
        (count, size)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    records: u64,
    data_size: u64,
}

/// Record map bound to one collection pool
pub struct RecordMap {
    pool: PersistentPool,
    root: ObjectId,
    counters: Mutex<Counters>,
}

impl RecordMap {
    /// Allocate an empty map root inside `tx`
    pub(crate) fn create(tx: &mut Transaction<'_>) -> PmseResult<ObjectId> {
        Ok(tx.alloc(&MapRoot::default())?)
    }

    /// Bind to the map rooted at `root` in `pool`
    pub fn attach(pool: PersistentPool, root: ObjectId) -> PmseResult<Self> {
        let map_root: MapRoot = pool.read(root)?;
        Ok(RecordMap {
            pool,
            root,
            counters: Mutex::new(Counters {
                records: map_root.record_count,
                data_size: map_root.data_size,
            }),
        })
    }

    /// Pool the map lives in
    pub fn pool(&self) -> &PersistentPool {
        &self.pool
    }

    /// Store `data` as a new record and return its location
    pub fn insert(&self, data: &[u8]) -> PmseResult<RecordId> {
        let mut counters = self.counters.lock();
        let id = self.pool.transaction(|tx| -> PmseResult<RecordId> {
            let mut root: MapRoot = tx.read(self.root)?;
            let id = RecordId::new(root.next_id);
            root.next_id += 1;
            link(tx, &mut root, id, data)?;
            tx.write(self.root, &root)?;
            Ok(id)
        })?;
        counters.records += 1;
        counters.data_size += data.len() as u64;
        Ok(id)
    }

    /// Put a previously removed record back at its original location
    ///
    /// # Errors
    /// Returns `AlreadyExists` if the location is occupied.
    pub fn restore(&self, record: &Record) -> PmseResult<()> {
        let mut counters = self.counters.lock();
        self.pool.transaction(|tx| -> PmseResult<()> {
            let mut root: MapRoot = tx.read(self.root)?;
            if root.records.contains_key(&record.id) {
                return Err(PmseError::already_exists(record.id.to_string()));
            }
            root.next_id = root.next_id.max(record.id.as_u64() + 1);
            link(tx, &mut root, record.id, &record.data)?;
            tx.write(self.root, &root)?;
            Ok(())
        })?;
        counters.records += 1;
        counters.data_size += record.data.len() as u64;
        debug!(target: "pmstore::engine", id = %record.id, "Record restored");
        Ok(())
    }

    /// Remove the record at `id`, returning it if it was present
    pub fn remove(&self, id: RecordId) -> PmseResult<Option<Record>> {
        let mut counters = self.counters.lock();
        let removed = self.pool.transaction(|tx| -> PmseResult<Option<Record>> {
            let mut root: MapRoot = tx.read(self.root)?;
            let slot = match root.records.remove(&id) {
                Some(slot) => slot,
                None => return Ok(None),
            };
            let data: Vec<u8> = tx.read(slot.object)?;
            tx.free(slot.object)?;
            root.record_count = root.record_count.saturating_sub(1);
            root.data_size = root.data_size.saturating_sub(slot.len);
            tx.write(self.root, &root)?;
            Ok(Some(Record { id, data }))
        })?;
        if let Some(record) = &removed {
            counters.records = counters.records.saturating_sub(1);
            counters.data_size = counters.data_size.saturating_sub(record.data.len() as u64);
        }
        Ok(removed)
    }

    /// Look up the record at `id`
    pub fn find(&self, id: RecordId) -> PmseResult<Option<Record>> {
        self.pool.transaction(|tx| -> PmseResult<Option<Record>> {
            let root: MapRoot = tx.read(self.root)?;
            match root.records.get(&id) {
                Some(slot) => Ok(Some(Record {
                    id,
                    data: tx.read(slot.object)?,
                })),
                None => Ok(None),
            }
        })
    }

    /// Check if a record exists at `id`
    pub fn contains(&self, id: RecordId) -> PmseResult<bool> {
        let root: MapRoot = self.pool.read(self.root)?;
        Ok(root.records.contains_key(&id))
    }

    /// Locations of all records, ascending
    pub fn record_ids(&self) -> PmseResult<Vec<RecordId>> {
        let root: MapRoot = self.pool.read(self.root)?;
        Ok(root.records.keys().copied().collect())
    }

    /// Number of records (cached)
    pub fn len(&self) -> u64 {
        self.counters.lock().records
    }

    /// Check if the map holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total payload bytes (cached)
    pub fn data_size(&self) -> u64 {
        self.counters.lock().data_size
    }

    /// Reconcile counters with the records actually present
    ///
    /// Recounts the map, persists the result if the stored counters drifted,
    /// and refreshes the in-memory cache. Returns whether a repair was needed.
    pub fn store_counters(&self) -> PmseResult<bool> {
        let mut counters = self.counters.lock();
        let (count, size, repaired) = self.pool.transaction(|tx| -> PmseResult<(u64, u64, bool)> {
            let mut root: MapRoot = tx.read(self.root)?;
            let (count, size) = root.recount();
            let drifted = root.record_count != count || root.data_size != size;
            if drifted {
                root.record_count = count;
                root.data_size = size;
                tx.write(self.root, &root)?;
            }
            Ok((count, size, drifted))
        })?;

        let actual = Counters {
            records: count,
            data_size: size,
        };
        let stale = *counters != actual;
        *counters = actual;
        drop(counters);

        if repaired || stale {
            warn!(
                target: "pmstore::engine",
                path = %self.pool.path().display(),
                records = count,
                data_size = size,
                "Record counters reconciled"
            );
        }
        Ok(repaired)
    }
}

impl std::fmt::Debug for RecordMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordMap")
            .field("pool", &self.pool)
            .field("records", &self.len())
            .field("data_size", &self.data_size())
            .finish()
    }
}

fn link(tx: &mut Transaction<'_>, root: &mut MapRoot, id: RecordId, data: &[u8]) -> PmseResult<()> {
    let object = tx.alloc(&data.to_vec())?;
    root.records.insert(
        id,
        RecordSlot {
            object,
            len: data.len() as u64,
        },
    );
    root.record_count += 1;
    root.data_size += data.len() as u64;
    Ok(())
}
