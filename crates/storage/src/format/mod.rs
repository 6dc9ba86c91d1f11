//! On-disk byte format for pool files.
//!
//! Keeping serialization separate from operational logic (how pools are
//! opened, mutated and closed) makes format evolution easier to manage.

pub mod pool_image;

pub use pool_image::{
    ImageError, PoolHeader, PoolImage, OBJECT_OVERHEAD, POOL_FIXED_OVERHEAD, POOL_FORMAT_VERSION,
    POOL_MAGIC,
};
