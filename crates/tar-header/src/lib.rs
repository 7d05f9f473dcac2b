//! Tar header decoding for archive indexers.
//!
//! The pieces here answer the questions an index asks of each member: what is
//! it called, what kind of entry is it, how large is it or where does it
//! point, where does its header start and where does its content start.
//!
//! - [`Header`] is a zero-copy view of one 512-byte block, covering V7,
//!   UStar and GNU layouts, with checked octal and base-256 numerics.
//! - [`PaxExtensions`] walks the records of a PAX extended header.
//! - [`sparse`] turns the PAX flavours of GNU sparse maps into chunk lists.
//! - [`stream`] folds GNU long names, PAX records and sparse maps into one
//!   [`stream::TarEntry`] per member, either while walking a whole archive
//!   or at a known offset through [`ReadAt`].
//!
//! ```
//! use tar_header::{EntryType, Header};
//!
//! let block = [0u8; 512];
//! let header = Header::from_bytes(&block).unwrap();
//! assert!(header.is_empty());
//! assert_eq!(header.entry_type(), EntryType::Regular);
//! ```

mod header;
mod numeric;
mod pax;
mod read_at;
pub mod sparse;
pub mod stream;

use thiserror::Error;

pub use header::{EntryType, Format, Header};
pub use numeric::{parse_numeric, parse_octal, parse_signed_numeric, truncate_null};
pub use pax::{
    PaxError, PaxExtension, PaxExtensions, PAX_GID, PAX_GNAME, PAX_GNU_SPARSE_MAJOR,
    PAX_GNU_SPARSE_MAP, PAX_GNU_SPARSE_MINOR, PAX_GNU_SPARSE_NAME, PAX_GNU_SPARSE_NUMBLOCKS,
    PAX_GNU_SPARSE_NUMBYTES, PAX_GNU_SPARSE_OFFSET, PAX_GNU_SPARSE_REALSIZE, PAX_GNU_SPARSE_SIZE,
    PAX_LINKPATH, PAX_MTIME, PAX_PATH, PAX_SIZE, PAX_UID, PAX_UNAME,
};
pub use read_at::ReadAt;

/// Bytes in a header block.
pub const HEADER_SIZE: usize = 512;

/// Archive granularity: headers and padded content both come in these.
pub const BLOCK_SIZE: u64 = 512;

/// A header block that cannot be decoded.
#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("header needs {HEADER_SIZE} bytes, got {0}")]
    InsufficientData(usize),

    #[error("bad numeric field {0:?}")]
    InvalidNumeric(Vec<u8>),

    /// The stored checksum disagrees with the block contents.
    #[error("header checksum is {expected}, block sums to {computed}")]
    ChecksumMismatch { expected: u64, computed: u64 },
}

pub type Result<T> = std::result::Result<T, HeaderError>;
