//! Caps on header-declared sizes.

use super::error::{Result, StreamError};

/// Upper bounds on what one member's metadata may make the decoder allocate.
///
/// Each field caps a size read from the archive before any buffer of that
/// size exists.
///
/// ```
/// use tar_header::stream::Limits;
///
/// let tight = Limits {
///     max_path_len: 255,
///     ..Limits::default()
/// };
/// assert_eq!(tight.max_pending_entries, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Longest accepted member name or link target, in bytes. Default 4096.
    pub max_path_len: usize,

    /// Largest PAX `x` content, and largest 1.0 sparse map. Default 1 MiB.
    pub max_pax_size: u64,

    /// Largest GNU `L`/`K` content. Default 4096.
    pub max_gnu_long_size: u64,

    /// Most metadata entries (`L`, `K`, `x`, `g`) allowed in a row before a
    /// real member. Default 16.
    pub max_pending_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_path_len: 4096,
            max_pax_size: 1 << 20,
            max_gnu_long_size: 4096,
            max_pending_entries: 16,
        }
    }
}

impl Limits {
    /// No caps at all, for archives from a trusted source.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            max_path_len: usize::MAX,
            max_pax_size: u64::MAX,
            max_gnu_long_size: u64::MAX,
            max_pending_entries: usize::MAX,
        }
    }

    /// Tighter caps than the default for archives of unknown origin.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_path_len: 1024,
            max_pax_size: 64 << 10,
            max_gnu_long_size: 1024,
            max_pending_entries: 8,
        }
    }

    pub(crate) fn check_path(&self, path: &[u8]) -> Result<()> {
        match path.len() {
            len if len > self.max_path_len => Err(StreamError::PathTooLong {
                len,
                limit: self.max_path_len,
            }),
            _ => Ok(()),
        }
    }
}
