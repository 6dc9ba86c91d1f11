//! Engine configuration via `pmse.toml`
//!
//! On first open, a default `pmse.toml` is created in the storage directory.
//! To change pool sizing or durability, edit the file and restart.

use pmstore_core::{
    Namespace, PmseError, PmseResult, DEFAULT_IDENT_LIST_POOL_SIZE, DEFAULT_SYSTEM_POOL_SIZE,
    DEFAULT_USER_POOL_SIZE, MIN_POOL_SIZE,
};
use pmstore_storage::PoolOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the storage directory.
pub const CONFIG_FILE_NAME: &str = "pmse.toml";

/// Engine configuration loaded from `pmse.toml`.
///
/// # Example
///
/// ```toml
/// ident_list_pool_size = 33554432
/// system_pool_size = 33554432
/// user_pool_size = 1677721600
/// sync_on_commit = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size in bytes of the ident-list pool.
    #[serde(default = "default_ident_list_pool_size")]
    pub ident_list_pool_size: u64,
    /// Size in bytes of pools backing internal collections.
    #[serde(default = "default_system_pool_size")]
    pub system_pool_size: u64,
    /// Size in bytes of pools backing user collections.
    #[serde(default = "default_user_pool_size")]
    pub user_pool_size: u64,
    /// Wait for every pool transaction to reach stable storage.
    #[serde(default = "default_sync_on_commit")]
    pub sync_on_commit: bool,
}

fn default_ident_list_pool_size() -> u64 {
    DEFAULT_IDENT_LIST_POOL_SIZE
}

fn default_system_pool_size() -> u64 {
    DEFAULT_SYSTEM_POOL_SIZE
}

fn default_user_pool_size() -> u64 {
    DEFAULT_USER_POOL_SIZE
}

fn default_sync_on_commit() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ident_list_pool_size: default_ident_list_pool_size(),
            system_pool_size: default_system_pool_size(),
            user_pool_size: default_user_pool_size(),
            sync_on_commit: default_sync_on_commit(),
        }
    }
}

impl EngineConfig {
    /// Config for tests: minimum-size pools, no fsync.
    pub fn for_testing() -> Self {
        Self {
            ident_list_pool_size: MIN_POOL_SIZE,
            system_pool_size: MIN_POOL_SIZE,
            user_pool_size: MIN_POOL_SIZE,
            sync_on_commit: false,
        }
    }

    /// Set the ident-list pool size
    pub fn with_ident_list_pool_size(mut self, size: u64) -> Self {
        self.ident_list_pool_size = size;
        self
    }

    /// Set the pool size for internal collections
    pub fn with_system_pool_size(mut self, size: u64) -> Self {
        self.system_pool_size = size;
        self
    }

    /// Set the pool size for user collections
    pub fn with_user_pool_size(mut self, size: u64) -> Self {
        self.user_pool_size = size;
        self
    }

    /// Set whether commits fsync
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Pool size for a new collection in `ns`.
    ///
    /// Internal collections get the smaller system size.
    pub fn pool_size_for(&self, ns: &Namespace) -> u64 {
        if ns.is_system() {
            self.system_pool_size
        } else {
            self.user_pool_size
        }
    }

    /// Pool options derived from this config
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions::new().sync_on_commit(self.sync_on_commit)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if any pool size is below the minimum pool size.
    pub fn validate(&self) -> PmseResult<()> {
        for (name, size) in [
            ("ident_list_pool_size", self.ident_list_pool_size),
            ("system_pool_size", self.system_pool_size),
            ("user_pool_size", self.user_pool_size),
        ] {
            if size < MIN_POOL_SIZE {
                return Err(PmseError::config(format!(
                    "{} = {} is below the minimum pool size of {} bytes",
                    name, size, MIN_POOL_SIZE
                )));
            }
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# pmstore engine configuration
#
# Pool sizes are in bytes and must be at least 8388608 (8 MiB).
#
# Ident-list pool (catalog of collections and indexes)
ident_list_pool_size = 33554432

# Pools for internal collections (system.*, admin, local, config)
system_pool_size = 33554432

# Pools for user collections
user_pool_size = 1677721600

# Wait for every pool transaction to reach stable storage (default: true)
sync_on_commit = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> PmseResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PmseError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            PmseError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> PmseResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                PmseError::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> PmseResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PmseError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            PmseError::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
