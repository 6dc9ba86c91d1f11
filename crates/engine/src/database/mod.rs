//! Engine struct and pool lifecycle
//!
//! The [`Engine`] owns every persistent pool of one storage directory:
//!
//! ```text
//! <dir>/
//! ├── pmse.toml        engine configuration
//! ├── pmse.lock        exclusive process lock
//! ├── pmse_identlist   ident catalog pool
//! └── <ident>          one pool per collection
//!
//! Idents may not take a reserved name or end in the pool scratch suffix.
//! ```
//!
//! ## Startup
//!
//! 1. Take the directory lock, then persist the configuration. A refused
//!    open leaves the running engine's `pmse.toml` untouched.
//! 2. Open (or create) the ident-list pool and bind the [`IdentCatalog`].
//!    Failure here is fatal and the engine is not constructed.
//! 3. Latch `needs_recovery_check` from the catalog's safe-shutdown marker.
//! 4. Reset the marker to "unsafe" so a crash before the next clean shutdown
//!    is detected on the following start.
//!
//! ## Structural operations
//!
//! Creating, opening and dropping record stores and sorted data interfaces
//! is serialized by one registry mutex. A pool handle enters the registry
//! only after the pool was opened or created successfully, and a failed
//! create removes whatever it registered.
//!
//! Index nodes follow the catalog: dropping a collection drops its index
//! idents, and a collection pool opened from disk has nodes with no
//! matching index ident unlinked.
//!
//! ## Teardown
//!
//! [`Engine::clean_shutdown`] (also run on drop) closes collection pools,
//! marks the catalog safe if every pool closed cleanly, then closes the
//! ident-list pool.

pub mod config;
mod registry;

pub use config::{EngineConfig, CONFIG_FILE_NAME};

use crate::catalog::IdentCatalog;
use crate::collection::CollectionRoot;
use crate::index_catalog::IndexCatalog;
use crate::record_map::RecordMap;
use crate::record_store::{CollectionOptions, RecordStore};
use crate::sorted::{IndexDescriptor, SortedDataInterface};
use parking_lot::Mutex;
use pmstore_core::{
    Ident, Namespace, PmseError, PmseResult, IDENT_LIST_FILENAME, IDENT_LIST_LAYOUT, MAPPER_LAYOUT,
};
use pmstore_storage::{PersistentPool, PoolError, SCRATCH_SUFFIX};
use registry::{PoolOrigin, PoolRegistry};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lock file held for the lifetime of an engine
pub const LOCK_FILE_NAME: &str = "pmse.lock";

/// File names in the storage directory that no ident may take
const RESERVED_NAMES: [&str; 3] = [IDENT_LIST_FILENAME, CONFIG_FILE_NAME, LOCK_FILE_NAME];

/// Pool registry and lifecycle manager for one storage directory
///
/// # Example
///
/// ```text
/// use pmstore_engine::{CollectionOptions, Engine, RecoveryUnit};
///
/// let engine = Engine::open("/path/to/data")?;
/// let store = engine.create_record_store(&"shop.orders".into(), &ident, &CollectionOptions::default())?;
///
/// let mut ru = RecoveryUnit::new();
/// store.insert_record(&mut ru, b"{...}")?;
/// ru.commit_unit_of_work()?;
///
/// engine.clean_shutdown()?;
/// ```
pub struct Engine {
    db_path: PathBuf,
    config: EngineConfig,
    catalog: IdentCatalog,
    registry: Mutex<PoolRegistry>,
    needs_recovery_check: bool,
    closed: AtomicBool,
    _lock_file: File,
}

impl Engine {
    /// Open the engine at `path`, reading `pmse.toml`
    ///
    /// A default `pmse.toml` is written first if the directory has none.
    pub fn open<P: AsRef<Path>>(path: P) -> PmseResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&db_path)?;

        let config_path = db_path.join(CONFIG_FILE_NAME);
        EngineConfig::write_default_if_missing(&config_path)?;
        let config = EngineConfig::from_file(&config_path)?;

        Self::open_with_config(db_path, config)
    }

    /// Open the engine at `path` with an explicit configuration
    ///
    /// The configuration is written to `pmse.toml` so later [`Engine::open`]
    /// calls use the same settings.
    ///
    /// # Errors
    /// - `Config` if `config` is invalid
    /// - `FatalInit` if the directory is locked by another engine or the
    ///   ident-list pool cannot be opened or created
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: EngineConfig) -> PmseResult<Self> {
        config.validate()?;
        let db_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&db_path)?;

        let lock_file = lock_directory(&db_path)?;
        config.write_to_file(&db_path.join(CONFIG_FILE_NAME))?;
        let catalog = open_catalog(&db_path, &config)?;

        let needs_recovery_check = !catalog.is_after_safe_shutdown()?;
        catalog.reset_state()?;

        if needs_recovery_check {
            warn!(
                target: "pmstore::engine",
                path = %db_path.display(),
                "Previous shutdown was not clean, recovery check required"
            );
        }
        info!(
            target: "pmstore::engine",
            path = %db_path.display(),
            idents = catalog.len()?,
            needs_recovery_check,
            "Engine opened"
        );

        Ok(Engine {
            db_path,
            config,
            catalog,
            registry: Mutex::new(PoolRegistry::default()),
            needs_recovery_check,
            closed: AtomicBool::new(false),
            _lock_file: lock_file,
        })
    }

    /// Storage directory
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the previous instance did not shut down cleanly
    pub fn needs_recovery_check(&self) -> bool {
        self.needs_recovery_check
    }

    /// The ident catalog
    pub fn catalog(&self) -> &IdentCatalog {
        &self.catalog
    }

    /// Create the record store `ident` for collection `ns`
    ///
    /// Creates the collection pool, or opens it if a file for `ident` is
    /// already present, then registers `ident → ns` in the catalog.
    ///
    /// # Errors
    /// - `AlreadyExists` if `ident` is already in the catalog
    /// - `InvalidIdent` if `ident` collides with a reserved file name
    /// - `OutOfSpace` if the pool cannot be created with the requested size
    ///
    /// On error nothing stays registered for `ident`.
    pub fn create_record_store(
        &self,
        ns: &Namespace,
        ident: &Ident,
        options: &CollectionOptions,
    ) -> PmseResult<RecordStore> {
        self.check_open()?;
        check_reserved(ident)?;

        let mut registry = self.registry.lock();
        if self.catalog.contains(ident)? {
            return Err(PmseError::already_exists(ident.as_str()));
        }

        let size = options
            .pool_size
            .unwrap_or_else(|| self.config.pool_size_for(ns));
        let (pool, origin) = self.acquire_pool(&mut registry, ident, Some(size))?;

        let registered = self
            .collection_map(&mut registry, ident, &pool)
            .and_then(|map| self.catalog.insert_kv(ident, ns).map(|()| map));
        let map = match registered {
            Ok(map) => map,
            Err(e) => {
                self.release_pool(&mut registry, ident, &pool, origin);
                return Err(e);
            }
        };

        info!(target: "pmstore::engine", %ident, %ns, origin = ?origin, "Record store created");
        Ok(RecordStore::new(
            ns.clone(),
            ident.clone(),
            map,
            self.needs_recovery_check,
        ))
    }

    /// Open the existing record store `ident`
    ///
    /// Reuses the pool if it is already open, restores the record counters,
    /// and records `ident → ns` in the catalog (replacing any previous
    /// namespace).
    ///
    /// # Errors
    /// Returns `NotFound` if no pool exists for `ident`.
    pub fn get_record_store(&self, ns: &Namespace, ident: &Ident) -> PmseResult<RecordStore> {
        self.check_open()?;
        let map = {
            let mut registry = self.registry.lock();
            let (pool, _) = self.acquire_pool(&mut registry, ident, None)?;
            self.collection_map(&mut registry, ident, &pool)?
        };

        map.store_counters()?;
        self.catalog.update(ident, ns)?;

        debug!(target: "pmstore::engine", %ident, %ns, "Record store opened");
        Ok(RecordStore::new(
            ns.clone(),
            ident.clone(),
            map,
            self.needs_recovery_check,
        ))
    }

    /// Create the sorted data interface `ident` for `descriptor`
    ///
    /// The tree and its index-catalog node are created in the owning
    /// collection's pool in one transaction; `ident` is then registered in
    /// the catalog with an empty namespace.
    ///
    /// # Errors
    /// - `NotFound` if no collection is registered under `descriptor.parent_ns`
    /// - `AlreadyExists` if `ident` is registered or the collection already
    ///   has an index named `ident`
    /// - `InvalidIdent` if `ident` is too long for an index-catalog node
    /// - `OutOfSpace` if the collection pool is full; nothing is linked
    pub fn create_sorted_data_interface(
        &self,
        ident: &Ident,
        descriptor: &IndexDescriptor,
    ) -> PmseResult<SortedDataInterface> {
        self.check_open()?;
        check_reserved(ident)?;

        let mut registry = self.registry.lock();
        if self.catalog.contains(ident)? {
            return Err(PmseError::already_exists(ident.as_str()));
        }

        let collection = self.owning_collection(&descriptor.parent_ns)?;
        let (pool, _) = self.acquire_pool(&mut registry, &collection, None)?;
        CollectionRoot::ensure(&pool)?;

        let indexes = IndexCatalog::new(pool.clone());
        let tree = indexes.create(ident)?;
        if let Err(e) = self.catalog.insert_kv(ident, &Namespace::empty()) {
            if let Err(undo) = indexes.remove(ident) {
                warn!(target: "pmstore::engine", %ident, error = %undo, "Failed to unlink index after catalog error");
            }
            return Err(e);
        }

        info!(
            target: "pmstore::engine",
            %ident,
            collection = %collection,
            index = %descriptor.name,
            "Sorted data interface created"
        );
        Ok(SortedDataInterface::new(
            ident.clone(),
            descriptor.clone(),
            pool,
            tree,
        ))
    }

    /// Open the sorted data interface `ident` for `descriptor`
    ///
    /// # Errors
    /// Returns `NotFound` if the owning collection or the index is missing.
    pub fn get_sorted_data_interface(
        &self,
        ident: &Ident,
        descriptor: &IndexDescriptor,
    ) -> PmseResult<SortedDataInterface> {
        self.check_open()?;
        let mut registry = self.registry.lock();

        let collection = self.owning_collection(&descriptor.parent_ns)?;
        let (pool, _) = self.acquire_pool(&mut registry, &collection, None)?;
        let tree = IndexCatalog::new(pool.clone()).find(ident)?.ok_or_else(|| {
            PmseError::not_found(format!("index '{}' in collection '{}'", ident, collection))
        })?;

        Ok(SortedDataInterface::new(
            ident.clone(),
            descriptor.clone(),
            pool,
            tree,
        ))
    }

    /// Drop `ident`
    ///
    /// The catalog entry is removed first and that step's failure is the
    /// only one returned. Dropping a collection also drops the idents of its
    /// indexes. Unlinking an index, closing the pool and deleting the backing
    /// file are best-effort and only logged on failure.
    ///
    /// # Errors
    /// - `InvalidIdent` if `ident` names one of the engine's own files
    pub fn drop_ident(&self, ident: &Ident) -> PmseResult<()> {
        self.check_open()?;
        check_reserved(ident)?;
        let mut registry = self.registry.lock();

        let ns = self.catalog.get(ident)?;
        self.catalog.delete_kv(ident)?;

        match &ns {
            Some(ns) if ns.is_empty() => self.unlink_index(&registry, ident),
            Some(_) => self.drop_collection_indexes(&registry, ident),
            None => {}
        }

        if let Some(entry) = registry.remove(ident) {
            if let Err(e) = entry.pool.close() {
                warn!(target: "pmstore::engine", %ident, error = %e, "Failed to close pool while dropping ident");
            }
        }
        remove_storage(&self.ident_path(ident));

        info!(target: "pmstore::engine", %ident, registered = ns.is_some(), "Ident dropped");
        Ok(())
    }

    /// Check if `ident` is in the catalog
    pub fn has_ident(&self, ident: &Ident) -> PmseResult<bool> {
        self.catalog.contains(ident)
    }

    /// Every ident in the catalog, in registration order
    pub fn all_idents(&self) -> PmseResult<Vec<Ident>> {
        Ok(self
            .catalog
            .entries()?
            .into_iter()
            .map(|(ident, _)| ident)
            .collect())
    }

    /// Namespace registered for `ident` (empty for indexes)
    pub fn ident_namespace(&self, ident: &Ident) -> PmseResult<Option<Namespace>> {
        self.catalog.get(ident)
    }

    /// Number of collection pools currently open
    pub fn open_pool_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Check if the engine was shut down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close every pool and mark the catalog safe
    ///
    /// Collection pools are closed first, then the ident-list pool. The
    /// safe-shutdown marker is only set if every collection pool closed
    /// cleanly. Calling this again is a no-op.
    pub fn clean_shutdown(&self) -> PmseResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut registry = self.registry.lock();
        let mut first_error: Option<PmseError> = None;

        for (ident, entry) in registry.drain() {
            if let Err(e) = entry.pool.close() {
                warn!(target: "pmstore::engine", %ident, error = %e, "Failed to close pool");
                first_error.get_or_insert(e.into());
            }
        }

        if first_error.is_none() {
            if let Err(e) = self.catalog.mark_safe_shutdown() {
                first_error = Some(e);
            }
        } else {
            warn!(target: "pmstore::engine", "Not marking safe shutdown after pool close failures");
        }

        if let Err(e) = self.catalog.pool().close() {
            first_error.get_or_insert(e.into());
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(target: "pmstore::engine", path = %self.db_path.display(), "Engine shut down cleanly");
                Ok(())
            }
        }
    }

    fn check_open(&self) -> PmseResult<()> {
        if self.is_closed() {
            return Err(PmseError::PoolClosed {
                path: self.db_path.display().to_string(),
            });
        }
        Ok(())
    }

    fn ident_path(&self, ident: &Ident) -> PathBuf {
        self.db_path.join(ident.as_str())
    }

    /// Resolve the pool for `ident`: reuse a registered handle, open the
    /// file if present, else create it with `create_size`. With no
    /// `create_size` a missing file is `NotFound`.
    fn acquire_pool(
        &self,
        registry: &mut PoolRegistry,
        ident: &Ident,
        create_size: Option<u64>,
    ) -> PmseResult<(PersistentPool, PoolOrigin)> {
        if let Some(entry) = registry.get(ident) {
            return Ok((entry.pool.clone(), PoolOrigin::Registered));
        }

        let path = self.ident_path(ident);
        let options = self.config.pool_options();
        let (pool, origin) = match create_size {
            Some(size) if !path.exists() => (
                options.create(&path, MAPPER_LAYOUT, size).map_err(|e| pool_error(ident, e))?,
                PoolOrigin::Created,
            ),
            _ => (
                options.open(&path, MAPPER_LAYOUT).map_err(|e| pool_error(ident, e))?,
                PoolOrigin::Opened,
            ),
        };

        if origin == PoolOrigin::Opened {
            self.prune_orphan_indexes(ident, &pool);
        }
        registry.insert(ident.clone(), pool.clone());
        Ok((pool, origin))
    }

    /// Shared record map of the collection in `pool`
    fn collection_map(
        &self,
        registry: &mut PoolRegistry,
        ident: &Ident,
        pool: &PersistentPool,
    ) -> PmseResult<Arc<RecordMap>> {
        if let Some(map) = registry.get(ident).and_then(|entry| entry.records.clone()) {
            return Ok(map);
        }

        let root = CollectionRoot::ensure(pool)?;
        let map = Arc::new(RecordMap::attach(pool.clone(), root.record_map)?);
        if let Some(entry) = registry.get_mut(ident) {
            entry.records = Some(map.clone());
        }
        Ok(map)
    }

    /// Undo `acquire_pool` after a failed create
    fn release_pool(
        &self,
        registry: &mut PoolRegistry,
        ident: &Ident,
        pool: &PersistentPool,
        origin: PoolOrigin,
    ) {
        if origin == PoolOrigin::Registered {
            return;
        }
        registry.remove(ident);
        if let Err(e) = pool.close() {
            warn!(target: "pmstore::engine", %ident, error = %e, "Failed to close pool after failed create");
        }
        if origin == PoolOrigin::Created {
            remove_storage(pool.path());
        }
    }

    /// Collection ident registered under `ns`
    fn owning_collection(&self, ns: &Namespace) -> PmseResult<Ident> {
        if ns.is_empty() {
            return Err(PmseError::not_found("collection for an empty namespace"));
        }
        self.catalog
            .find_first_value(ns)?
            .ok_or_else(|| PmseError::not_found(format!("collection for namespace '{}'", ns)))
    }

    /// Best-effort removal of the index node for `ident` from whichever
    /// open collection pool holds it
    ///
    /// Pools that are not open are left alone; their stale nodes are
    /// unlinked when the pool is next opened.
    fn unlink_index(&self, registry: &PoolRegistry, ident: &Ident) {
        for (collection, pool) in registry.pools() {
            match IndexCatalog::new(pool).remove(ident) {
                Ok(true) => {
                    debug!(target: "pmstore::engine", %ident, %collection, "Index unlinked");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(target: "pmstore::engine", %ident, %collection, error = %e, "Failed to unlink index");
                }
            }
        }
    }

    /// Best-effort removal of the index idents of `collection` from the
    /// catalog
    fn drop_collection_indexes(&self, registry: &PoolRegistry, collection: &Ident) {
        let pool = match registry.get(collection) {
            Some(entry) => Ok(entry.pool.clone()),
            None => self
                .config
                .pool_options()
                .open(self.ident_path(collection), MAPPER_LAYOUT)
                .map_err(|e| pool_error(collection, e)),
        };
        let names = pool.and_then(|pool| {
            let names = index_names(&pool);
            if registry.get(collection).is_none() {
                // Opened only to read the list
                if let Err(e) = pool.close() {
                    warn!(target: "pmstore::engine", %collection, error = %e, "Failed to close pool after reading indexes");
                }
            }
            names
        });
        let names = match names {
            Ok(names) => names,
            Err(e) => {
                warn!(target: "pmstore::engine", %collection, error = %e, "Failed to list indexes of dropped collection");
                return;
            }
        };

        for name in names {
            let index = match Ident::new(name) {
                Ok(index) => index,
                Err(_) => continue,
            };
            let dropped = match self.catalog.get(&index) {
                Ok(Some(ns)) if ns.is_empty() => self.catalog.delete_kv(&index),
                Ok(_) => Ok(false),
                Err(e) => Err(e),
            };
            match dropped {
                Ok(true) => {
                    debug!(target: "pmstore::engine", %collection, %index, "Index ident dropped with collection");
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(target: "pmstore::engine", %collection, %index, error = %e, "Failed to drop index ident");
                }
            }
        }
    }

    /// Unlink index nodes of a freshly opened collection pool that have no
    /// index ident in the catalog
    fn prune_orphan_indexes(&self, collection: &Ident, pool: &PersistentPool) {
        let names = match index_names(pool) {
            Ok(names) => names,
            Err(e) => {
                warn!(target: "pmstore::engine", %collection, error = %e, "Failed to list indexes");
                return;
            }
        };
        let indexes = IndexCatalog::new(pool.clone());
        for name in names {
            let index = match Ident::new(name) {
                Ok(index) => index,
                Err(_) => continue,
            };
            let orphan = match self.catalog.get(&index) {
                Ok(Some(ns)) => !ns.is_empty(),
                Ok(None) => true,
                Err(e) => {
                    warn!(target: "pmstore::engine", %collection, %index, error = %e, "Failed to look up index ident");
                    false
                }
            };
            if !orphan {
                continue;
            }
            match indexes.remove(&index) {
                Ok(_) => {
                    info!(target: "pmstore::engine", %collection, %index, "Unlinked index with no catalog entry");
                }
                Err(e) => {
                    warn!(target: "pmstore::engine", %collection, %index, error = %e, "Failed to unlink orphan index");
                }
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.clean_shutdown() {
            error!(target: "pmstore::engine", path = %self.db_path.display(), error = %e, "Shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("db_path", &self.db_path)
            .field("needs_recovery_check", &self.needs_recovery_check)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn check_reserved(ident: &Ident) -> PmseResult<()> {
    if RESERVED_NAMES.contains(&ident.as_str()) {
        return Err(PmseError::invalid_ident(
            ident.as_str(),
            "name is reserved by the engine",
        ));
    }
    if ident.as_str().ends_with(SCRATCH_SUFFIX) {
        return Err(PmseError::invalid_ident(
            ident.as_str(),
            format!("names ending in '{}' are reserved for pool scratch files", SCRATCH_SUFFIX),
        ));
    }
    Ok(())
}

/// Index names of a collection pool; a pool with no root has none
fn index_names(pool: &PersistentPool) -> PmseResult<Vec<String>> {
    if pool.root_id()?.is_none() {
        return Ok(Vec::new());
    }
    IndexCatalog::new(pool.clone()).names()
}

/// Attribute pool errors to the ident they were raised for
fn pool_error(ident: &Ident, e: PoolError) -> PmseError {
    match e {
        PoolError::OutOfSpace {
            requested,
            available,
            ..
        } => PmseError::OutOfSpace {
            ident: ident.to_string(),
            requested,
            available,
        },
        PoolError::NotFound { .. } => PmseError::not_found(format!("pool for '{}'", ident)),
        other => other.into(),
    }
}

fn lock_directory(db_path: &Path) -> PmseResult<File> {
    let lock_path = db_path.join(LOCK_FILE_NAME);
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| PmseError::fatal_init(format!("failed to open lock file: {}", e)))?;
    fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
        PmseError::fatal_init(format!(
            "storage directory '{}' is already in use by another engine",
            db_path.display()
        ))
    })?;
    Ok(lock_file)
}

fn open_catalog(db_path: &Path, config: &EngineConfig) -> PmseResult<IdentCatalog> {
    let path = db_path.join(IDENT_LIST_FILENAME);
    let options = config.pool_options();
    let pool = if path.exists() {
        options.open(&path, IDENT_LIST_LAYOUT)
    } else {
        options.create(&path, IDENT_LIST_LAYOUT, config.ident_list_pool_size)
    }
    .map_err(|e| {
        error!(target: "pmstore::engine", path = %path.display(), error = %e, "Cannot open ident list pool");
        PmseError::fatal_init(format!("ident list pool '{}': {}", path.display(), e))
    })?;

    IdentCatalog::initialize(pool)
        .map_err(|e| PmseError::fatal_init(format!("ident catalog: {}", e)))
}

/// Best-effort delete of an ident's backing storage
fn remove_storage(path: &Path) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => debug!(target: "pmstore::engine", path = %path.display(), "Pool storage removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(target: "pmstore::engine", path = %path.display(), error = %e, "Failed to remove pool storage");
        }
    }
}
