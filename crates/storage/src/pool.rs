//! Persistent pools
//!
//! A [`PersistentPool`] is a fixed-capacity region of persistent storage
//! backed by one file and addressed through a root object. The file is
//! memory-mapped on open to load the committed image; mutations go through
//! [`PersistentPool::transaction`], which persists a complete new image with
//! the write-fsync-rename pattern so a crash leaves either the old or the new
//! state on disk, never a mix.
//!
//! Handles are cheap to clone and share one underlying pool. Closing is
//! idempotent; every operation on a closed handle returns
//! [`PoolError::Closed`].

use crate::error::{PoolError, PoolResult};
use crate::format::{PoolHeader, PoolImage};
use crate::transaction::Transaction;
use memmap2::Mmap;
use parking_lot::Mutex;
use pmstore_core::{ObjectId, MIN_POOL_SIZE};
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Suffix of the scratch file a commit writes before renaming it into place
///
/// Callers that name pool files must keep this suffix out of their names.
pub const SCRATCH_SUFFIX: &str = ".pmtmp";

/// Options for creating or opening a pool
#[derive(Debug, Clone)]
pub struct PoolOptions {
    sync_on_commit: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            sync_on_commit: true,
        }
    }
}

impl PoolOptions {
    /// Default options: fsync on every commit
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether each commit waits for the data to reach stable storage
    pub fn sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Create a new pool file at `path`
    ///
    /// # Errors
    /// - `AlreadyExists` if anything exists at `path`
    /// - `OutOfSpace` if `capacity` is below [`MIN_POOL_SIZE`]
    pub fn create(
        &self,
        path: impl AsRef<Path>,
        layout: &str,
        capacity: u64,
    ) -> PoolResult<PersistentPool> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            return Err(PoolError::AlreadyExists { path });
        }
        if capacity < MIN_POOL_SIZE {
            return Err(PoolError::OutOfSpace {
                path,
                requested: MIN_POOL_SIZE,
                available: capacity,
            });
        }

        let header = PoolHeader::new(uuid::Uuid::new_v4().into_bytes(), layout, capacity);
        let image = PoolImage::default();
        let bytes = image.to_bytes(&header).map_err(|e| PoolError::Aborted {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_image(&path, &bytes, capacity, self.sync_on_commit)?;

        info!(
            target: "pmstore::pool",
            path = %path.display(),
            layout,
            capacity,
            "Pool created"
        );
        Ok(PersistentPool::from_parts(
            path,
            header,
            image,
            bytes.len() as u64,
            self.sync_on_commit,
        ))
    }

    /// Open an existing pool file at `path`
    ///
    /// # Errors
    /// - `NotFound` if there is no file at `path`
    /// - `Corruption` if the file is not a valid pool image
    /// - `LayoutMismatch` if the pool was created with another layout
    pub fn open(&self, path: impl AsRef<Path>, layout: &str) -> PoolResult<PersistentPool> {
        let path = path.as_ref().to_path_buf();
        remove_stale_scratch(&path)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PoolError::NotFound { path });
            }
            Err(e) => return Err(e.into()),
        };
        if !file.metadata()?.is_file() {
            return Err(PoolError::Corruption(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        // SAFETY: the mapping is read-only and dropped before this function
        // returns; pool files are only replaced by rename, never written in place.
        let mmap = unsafe { Mmap::map(&file) }?;
        let (header, image) = PoolImage::from_bytes(&mmap[..])
            .map_err(|e| PoolError::Corruption(format!("{}: {}", path.display(), e)))?;
        drop(mmap);

        if header.layout != layout {
            return Err(PoolError::LayoutMismatch {
                expected: layout.to_string(),
                found: header.layout,
            });
        }

        let used = image.encoded_len(&header);
        info!(
            target: "pmstore::pool",
            path = %path.display(),
            layout,
            objects = image.objects.len(),
            "Pool opened"
        );
        Ok(PersistentPool::from_parts(
            path,
            header,
            image,
            used,
            self.sync_on_commit,
        ))
    }
}

/// Handle to one open persistent pool
#[derive(Clone)]
pub struct PersistentPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    path: PathBuf,
    header: PoolHeader,
    sync_on_commit: bool,
    state: Mutex<PoolState>,
}

struct PoolState {
    image: PoolImage,
    /// Encoded size of `image`
    used: u64,
    closed: bool,
}

impl PersistentPool {
    /// Create a pool with default options
    pub fn create(path: impl AsRef<Path>, layout: &str, capacity: u64) -> PoolResult<Self> {
        PoolOptions::default().create(path, layout, capacity)
    }

    /// Open a pool with default options
    pub fn open(path: impl AsRef<Path>, layout: &str) -> PoolResult<Self> {
        PoolOptions::default().open(path, layout)
    }

    fn from_parts(
        path: PathBuf,
        header: PoolHeader,
        image: PoolImage,
        used: u64,
        sync_on_commit: bool,
    ) -> Self {
        PersistentPool {
            inner: Arc::new(PoolInner {
                path,
                header,
                sync_on_commit,
                state: Mutex::new(PoolState {
                    image,
                    used,
                    closed: false,
                }),
            }),
        }
    }

    /// Run `f` as one atomic transaction
    ///
    /// If `f` returns `Ok`, everything it staged is applied and persisted
    /// before this call returns. If `f` returns `Err`, or the new image does
    /// not fit in the pool, nothing is applied.
    ///
    /// The pool is locked for the duration of `f`; use the transaction's
    /// own read methods rather than reading through the pool handle inside it.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, E>,
        E: From<PoolError>,
    {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(self.closed_error().into());
        }

        let mut tx = Transaction::new(&state.image);
        let value = match f(&mut tx) {
            Ok(value) => value,
            Err(e) => {
                debug!(target: "pmstore::pool", path = %self.inner.path.display(), "Transaction aborted");
                return Err(e);
            }
        };
        if tx.is_empty() {
            return Ok(value);
        }

        let image = tx.apply();
        let bytes = image
            .to_bytes(&self.inner.header)
            .map_err(|e| PoolError::Aborted {
                path: self.inner.path.clone(),
                reason: e.to_string(),
            })?;
        let capacity = self.inner.header.capacity;
        if bytes.len() as u64 > capacity {
            return Err(PoolError::OutOfSpace {
                path: self.inner.path.clone(),
                requested: bytes.len() as u64 - state.used,
                available: capacity.saturating_sub(state.used),
            }
            .into());
        }

        write_image(&self.inner.path, &bytes, capacity, self.inner.sync_on_commit)
            .map_err(PoolError::from)?;
        state.image = image;
        state.used = bytes.len() as u64;
        Ok(value)
    }

    /// Read an object from the committed image
    pub fn read<T: DeserializeOwned>(&self, id: ObjectId) -> PoolResult<T> {
        let state = self.open_state()?;
        let bytes = state
            .image
            .objects
            .get(&id)
            .ok_or(PoolError::MissingObject(id))?;
        Ok(bincode::deserialize(bytes)?)
    }

    /// Check whether an object is live in the committed image
    pub fn contains(&self, id: ObjectId) -> PoolResult<bool> {
        Ok(self.open_state()?.image.objects.contains_key(&id))
    }

    /// Root object of the committed image
    pub fn root_id(&self) -> PoolResult<Option<ObjectId>> {
        Ok(self.open_state()?.image.root)
    }

    /// Read the root object, if set
    pub fn root<T: DeserializeOwned>(&self) -> PoolResult<Option<T>> {
        match self.root_id()? {
            Some(id) => self.read(id).map(Some),
            None => Ok(None),
        }
    }

    /// Number of live objects
    pub fn object_count(&self) -> PoolResult<usize> {
        Ok(self.open_state()?.image.objects.len())
    }

    /// Bytes occupied by the committed image
    pub fn used_bytes(&self) -> u64 {
        self.inner.state.lock().used
    }

    /// Bytes still free
    pub fn available_bytes(&self) -> u64 {
        self.capacity().saturating_sub(self.used_bytes())
    }

    /// Total capacity the pool was created with
    pub fn capacity(&self) -> u64 {
        self.inner.header.capacity
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Layout name stamped at creation
    pub fn layout(&self) -> &str {
        &self.inner.header.layout
    }

    /// Unique id stamped at creation
    pub fn uuid(&self) -> [u8; 16] {
        self.inner.header.uuid
    }

    /// Check if the pool was closed
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Check if two handles refer to the same open pool
    pub fn ptr_eq(&self, other: &PersistentPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Close the pool
    ///
    /// Issues a final durability barrier on the backing file. The handle is
    /// marked closed even if the barrier fails; closing twice is a no-op.
    pub fn close(&self) -> PoolResult<()> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        let file = File::open(&self.inner.path)?;
        file.sync_all()?;
        info!(target: "pmstore::pool", path = %self.inner.path.display(), "Pool closed");
        Ok(())
    }

    fn open_state(&self) -> PoolResult<parking_lot::MutexGuard<'_, PoolState>> {
        let state = self.inner.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }
        Ok(state)
    }

    fn closed_error(&self) -> PoolError {
        PoolError::Closed {
            path: self.inner.path.clone(),
        }
    }
}

impl std::fmt::Debug for PersistentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentPool")
            .field("path", &self.inner.path)
            .field("layout", &self.inner.header.layout)
            .field("capacity", &self.inner.header.capacity)
            .finish()
    }
}

/// Persist a full image: write a scratch file, extend it to capacity,
/// optionally fsync, then rename it over the pool file.
fn write_image(path: &Path, bytes: &[u8], capacity: u64, sync: bool) -> io::Result<()> {
    let temp_path = scratch_path(path);

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(bytes)?;
    file.set_len(capacity)?;
    if sync {
        file.sync_all()?;
    }
    drop(file);

    fs::rename(&temp_path, path)?;

    if sync {
        if let Some(parent) = path.parent() {
            if parent.exists() {
                let dir = File::open(parent)?;
                dir.sync_all()?;
            }
        }
    }
    Ok(())
}

fn scratch_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(SCRATCH_SUFFIX);
    path.with_file_name(name)
}

/// Delete the scratch file a crash mid-commit left next to `path`
fn remove_stale_scratch(path: &Path) -> io::Result<()> {
    let scratch = scratch_path(path);
    match fs::remove_file(&scratch) {
        Ok(()) => {
            debug!(target: "pmstore::pool", path = %scratch.display(), "Removed stale scratch file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
