//! Error types for index building and member access.
//!
//! Every failure is reported to the caller. Nothing here retries or falls
//! back: a stale index or a dangling link must surface as an error rather
//! than as wrong bytes.

use std::io;

use tar_header::stream::StreamError;
use thiserror::Error;

use crate::member::RecordSummary;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A shard is not a structurally valid tar stream.
    #[error("{shard}: malformed archive: {source}")]
    Format {
        /// The shard being read.
        shard: String,
        /// What the decoder rejected.
        source: StreamError,
    },

    /// A member uses the legacy GNU sparse representation.
    #[error("{shard}: member {member:?} at offset {offset} uses the unsupported GNU sparse format")]
    UnsupportedFormat {
        /// The shard being read.
        shard: String,
        /// Name of the offending member.
        member: String,
        /// Offset of its header.
        offset: u64,
    },

    /// The name is not in the index, or a link points at a name that is not.
    #[error("no such member: {0:?}")]
    NotFound(String),

    /// The archive no longer matches what the index recorded.
    #[error("Index mismatch: expected {expected}, got {actual}")]
    IndexMismatch {
        /// The record as stored in the index.
        expected: Box<RecordSummary>,
        /// The record decoded from the shard just now.
        actual: Box<RecordSummary>,
    },

    /// Shard naming or detection did not yield a unique layout.
    #[error("shard layout: {0}")]
    Layout(String),

    /// The archive reader was closed.
    #[error("operation on a closed archive")]
    UseAfterClose,

    /// Link resolution exceeded the redirect limit.
    #[error("too many link redirects resolving {name:?} (limit {limit})")]
    LinkCycle {
        /// The name that was being opened.
        name: String,
        /// The configured redirect limit.
        limit: usize,
    },

    /// I/O error from the underlying storage.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The persisted index could not be encoded or decoded.
    #[error("index file: {0}")]
    Codec(#[from] bincode::Error),
}

impl Error {
    /// Attribute a decoder error to a shard, splitting out the sparse and
    /// I/O cases.
    pub(crate) fn from_stream(shard: impl Into<String>, err: StreamError) -> Self {
        match err {
            StreamError::UnsupportedSparse { path, pos } => Error::UnsupportedFormat {
                shard: shard.into(),
                member: path,
                offset: pos,
            },
            StreamError::Io(e) => Error::Io(e),
            source => Error::Format {
                shard: shard.into(),
                source,
            },
        }
    }

    /// Whether this is an index/archive mismatch found by verification.
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Error::IndexMismatch { .. })
    }
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_stream() {
        let err = Error::from_stream(
            "a.tar",
            StreamError::UnsupportedSparse {
                path: "disk.img".into(),
                pos: 1024,
            },
        );
        assert_eq!(
            err.to_string(),
            "a.tar: member \"disk.img\" at offset 1024 uses the unsupported GNU sparse format"
        );

        let err = Error::from_stream("a.tar", StreamError::UnexpectedEof { pos: 7 });
        assert!(matches!(err, Error::Format { .. }));

        let err = Error::from_stream("a.tar", StreamError::Io(io::ErrorKind::Other.into()));
        assert!(matches!(err, Error::Io(_)));
    }
}
