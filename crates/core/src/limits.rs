//! Pool sizing and naming limits
//!
//! Default pool sizes are expressed as multiples of [`MIN_POOL_SIZE`], the
//! smallest pool the storage layer will create.

/// Smallest pool the storage layer accepts (8 MiB)
pub const MIN_POOL_SIZE: u64 = 8 * 1024 * 1024;

/// Default size of the ident-list pool
pub const DEFAULT_IDENT_LIST_POOL_SIZE: u64 = 4 * MIN_POOL_SIZE;

/// Default size of a pool backing an internal/system collection
pub const DEFAULT_SYSTEM_POOL_SIZE: u64 = 4 * MIN_POOL_SIZE;

/// Default size of a pool backing a user collection
pub const DEFAULT_USER_POOL_SIZE: u64 = 200 * MIN_POOL_SIZE;

/// Capacity of the name buffer in an index catalog node
pub const IDENT_NAME_CAPACITY: usize = 128;

/// File name of the ident-list pool inside the storage directory
pub const IDENT_LIST_FILENAME: &str = "pmse_identlist";

/// Layout name stamped into the ident-list pool
pub const IDENT_LIST_LAYOUT: &str = "pmse_identlist";

/// Layout name stamped into every collection pool
pub const MAPPER_LAYOUT: &str = "pmse_mapper";
