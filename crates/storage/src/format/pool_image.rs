//! Pool file format
//!
//! A pool file holds one complete image of the pool's object arena. Every
//! committed transaction writes a fresh image, so the bytes on disk always
//! describe a fully applied state.
//!
//! # Format
//!
//! ```text
//! +---------------------+
//! | Magic: "PMSP"       | 4 bytes
//! | Format Version      | 4 bytes (u32 LE)
//! | Pool UUID           | 16 bytes
//! | Layout Length       | 4 bytes (u32 LE)
//! | Layout              | variable
//! | Capacity            | 8 bytes (u64 LE)
//! | Root Object         | 8 bytes (u64 LE, 0 = none)
//! | Next Object Id      | 8 bytes (u64 LE)
//! | Object Count        | 8 bytes (u64 LE)
//! | Objects             | count * (id u64 LE, len u32 LE, bytes)
//! | CRC32               | 4 bytes (over everything above)
//! | zero padding        | up to capacity
//! +---------------------+
//! ```

use pmstore_core::ObjectId;
use std::collections::BTreeMap;

/// Pool magic bytes: "PMSP" (0x504D5350)
pub const POOL_MAGIC: [u8; 4] = *b"PMSP";

/// Current pool format version
pub const POOL_FORMAT_VERSION: u32 = 1;

/// Bytes taken by the fixed part of the header and the trailing CRC,
/// excluding the layout string
pub const POOL_FIXED_OVERHEAD: u64 = 4 + 4 + 16 + 4 + 8 + 8 + 8 + 8 + 4;

/// Per-object framing: id + length prefix
pub const OBJECT_OVERHEAD: u64 = 8 + 4;

/// Immutable identity of a pool, written once at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolHeader {
    /// Format version for forward compatibility
    pub format_version: u32,
    /// Unique pool identifier (generated on creation)
    pub uuid: [u8; 16],
    /// Layout name the pool was created with
    pub layout: String,
    /// Total bytes the pool may occupy
    pub capacity: u64,
}

impl PoolHeader {
    /// Create a header for a fresh pool
    pub fn new(uuid: [u8; 16], layout: impl Into<String>, capacity: u64) -> Self {
        PoolHeader {
            format_version: POOL_FORMAT_VERSION,
            uuid,
            layout: layout.into(),
            capacity,
        }
    }
}

/// The object arena of a pool
///
/// Objects are opaque byte strings keyed by [`ObjectId`]. The root table is a
/// single optional pointer to the object callers start traversal from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolImage {
    /// Root object, if one has been set
    pub root: Option<ObjectId>,
    /// Next object id to hand out (ids are never reused)
    pub next_id: u64,
    /// Live objects
    pub objects: BTreeMap<ObjectId, Vec<u8>>,
}

impl Default for PoolImage {
    fn default() -> Self {
        PoolImage {
            root: None,
            next_id: 1,
            objects: BTreeMap::new(),
        }
    }
}

impl PoolImage {
    /// Bytes this image occupies on disk under the given header
    pub fn encoded_len(&self, header: &PoolHeader) -> u64 {
        POOL_FIXED_OVERHEAD
            + header.layout.len() as u64
            + self
                .objects
                .values()
                .map(|bytes| OBJECT_OVERHEAD + bytes.len() as u64)
                .sum::<u64>()
    }

    /// Serialize header and image to bytes (without padding)
    ///
    /// # Errors
    /// - `ObjectTooLarge` if an object's length does not fit its `u32` prefix
    pub fn to_bytes(&self, header: &PoolHeader) -> Result<Vec<u8>, ImageError> {
        let mut bytes = Vec::with_capacity(self.encoded_len(header) as usize);

        bytes.extend_from_slice(&POOL_MAGIC);
        bytes.extend_from_slice(&header.format_version.to_le_bytes());
        bytes.extend_from_slice(&header.uuid);
        let layout_len = u32::try_from(header.layout.len()).map_err(|_| ImageError::InvalidLayout)?;
        bytes.extend_from_slice(&layout_len.to_le_bytes());
        bytes.extend_from_slice(header.layout.as_bytes());
        bytes.extend_from_slice(&header.capacity.to_le_bytes());

        let root = self.root.map(|id| id.as_u64()).unwrap_or(0);
        bytes.extend_from_slice(&root.to_le_bytes());
        bytes.extend_from_slice(&self.next_id.to_le_bytes());
        bytes.extend_from_slice(&(self.objects.len() as u64).to_le_bytes());

        for (id, data) in &self.objects {
            bytes.extend_from_slice(&id.as_u64().to_le_bytes());
            bytes.extend_from_slice(&object_len_prefix(*id, data.len())?.to_le_bytes());
            bytes.extend_from_slice(data);
        }

        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        Ok(bytes)
    }

    /// Deserialize header and image from the start of `bytes`
    ///
    /// Trailing bytes after the CRC (the zero padding) are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<(PoolHeader, PoolImage), ImageError> {
        let mut reader = Reader::new(bytes);

        if reader.take(4)? != POOL_MAGIC {
            return Err(ImageError::InvalidMagic);
        }

        let format_version = reader.u32()?;
        if format_version != POOL_FORMAT_VERSION {
            return Err(ImageError::UnsupportedVersion(format_version));
        }

        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(reader.take(16)?);

        let layout_len = reader.u32()? as usize;
        let layout = String::from_utf8(reader.take(layout_len)?.to_vec())
            .map_err(|_| ImageError::InvalidLayout)?;
        let capacity = reader.u64()?;

        let root = match reader.u64()? {
            0 => None,
            id => Some(ObjectId::new(id)),
        };
        let next_id = reader.u64()?;
        let count = reader.u64()?;

        let mut objects = BTreeMap::new();
        for _ in 0..count {
            let id = reader.u64()?;
            let len = reader.u32()? as usize;
            let data = reader.take(len)?.to_vec();
            if id == 0 || id >= next_id {
                return Err(ImageError::InvalidObjectId(id));
            }
            objects.insert(ObjectId::new(id), data);
        }

        let body_end = reader.pos;
        let stored_crc = reader.u32()?;
        let computed_crc = crc32fast::hash(&bytes[..body_end]);
        if stored_crc != computed_crc {
            return Err(ImageError::ChecksumMismatch {
                expected: stored_crc,
                computed: computed_crc,
            });
        }

        if let Some(root) = root {
            if !objects.contains_key(&root) {
                return Err(ImageError::DanglingRoot(root.as_u64()));
            }
        }

        let header = PoolHeader {
            format_version,
            uuid,
            layout,
            capacity,
        };
        let image = PoolImage {
            root,
            next_id,
            objects,
        };
        Ok((header, image))
    }
}

/// Bounds-checked little-endian reader
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ImageError> {
        let end = self.pos.checked_add(len).ok_or(ImageError::TooShort)?;
        let slice = self.bytes.get(self.pos..end).ok_or(ImageError::TooShort)?;
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, ImageError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, ImageError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

/// Length prefix of an encoded object
fn object_len_prefix(id: ObjectId, len: usize) -> Result<u32, ImageError> {
    u32::try_from(len).map_err(|_| ImageError::ObjectTooLarge {
        id: id.as_u64(),
        len: len as u64,
    })
}

/// Errors that can occur while encoding or decoding a pool image
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// Image truncated
    #[error("pool image too short")]
    TooShort,

    /// Invalid magic bytes
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Format version this build cannot read
    #[error("unsupported pool format version {0}")]
    UnsupportedVersion(u32),

    /// Layout name is not valid UTF-8
    #[error("invalid layout name")]
    InvalidLayout,

    /// Object id is zero or beyond the allocation counter
    #[error("invalid object id {0}")]
    InvalidObjectId(u64),

    /// Root points at an object that is not in the image
    #[error("root points at missing object {0}")]
    DanglingRoot(u64),

    /// Object too large for its length prefix
    #[error("object {id} is {len} bytes, larger than an object can be")]
    ObjectTooLarge {
        /// Object id
        id: u64,
        /// Encoded length in bytes
        len: u64,
    },

    /// Checksum mismatch
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Expected CRC32 value (from file)
        expected: u32,
        /// Computed CRC32 value
        computed: u32,
    },
}
