use std::str::Utf8Error;

use thiserror::Error;

use crate::sparse::SparseError;
use crate::{HeaderError, PaxError};

/// Failure to decode a member group.
///
/// Every variant except [`Io`](Self::Io) describes the archive bytes
/// themselves; see [`is_format_error`](Self::is_format_error).
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad header at offset {pos}: {source}")]
    Header { pos: u64, source: HeaderError },

    #[error("bad PAX header: {0}")]
    Pax(#[from] PaxError),

    #[error("PAX key is not UTF-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),

    #[error("bad sparse map: {0}")]
    Sparse(#[from] SparseError),

    #[error("name of {len} bytes is over the {limit} byte limit")]
    PathTooLong { len: usize, limit: usize },

    #[error("PAX header of {size} bytes is over the {limit} byte limit")]
    PaxTooLarge { size: u64, limit: u64 },

    #[error("GNU long name of {size} bytes is over the {limit} byte limit")]
    GnuLongTooLarge { size: u64, limit: u64 },

    /// The same kind of metadata entry appeared twice for one member.
    #[error("second {kind} entry for one member at offset {pos}")]
    DuplicateMetadata { kind: &'static str, pos: u64 },

    /// The archive ended after metadata entries but before their member.
    #[error("archive ends inside a metadata group")]
    OrphanedMetadata,

    #[error("{count} metadata entries in a row, limit is {limit}")]
    TooManyPendingEntries { count: usize, limit: usize },

    /// A size whose block-padded form does not fit in a `u64`.
    #[error("entry size {0} out of range")]
    InvalidSize(u64),

    #[error("archive truncated at offset {pos}")]
    UnexpectedEof { pos: u64 },

    /// Old GNU sparse (`S`) members keep their map in the header itself and
    /// are refused.
    #[error("{path}: old GNU sparse member at offset {pos} is not supported")]
    UnsupportedSparse { path: String, pos: u64 },

    /// A positional decode landed on the end-of-archive marker or past the
    /// end of the source.
    #[error("no tar entry at offset {pos}")]
    NoEntry { pos: u64 },
}

impl StreamError {
    /// True unless the source itself failed to read.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        !matches!(self, StreamError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
