use std::borrow::Cow;

use crate::sparse::SparseChunk;
use crate::{EntryType, Header, BLOCK_SIZE};

/// One member with its metadata entries folded in, and where it sits in the
/// archive.
#[derive(Debug, Clone)]
pub struct TarEntry {
    /// Start of the member's group: its first `L`, `K` or `x` entry if it has
    /// any, else its own header. Decoding again from here replays the group.
    pub header_offset: u64,

    /// First stored content byte. For 1.0 sparse members this is past the
    /// in-data map.
    pub data_offset: u64,

    /// The member's own header block.
    pub header: Header,

    pub entry_type: EntryType,

    /// `GNU.sparse.name`, then PAX `path`, then a GNU long name, then
    /// `prefix/name` from the header, whichever comes first.
    pub path: Vec<u8>,

    /// PAX `linkpath`, then a GNU long link, then the header's link name.
    /// `None` when all are empty.
    pub link_target: Option<Vec<u8>>,

    /// Logical size; the expanded size for sparse members.
    pub size: u64,

    /// Bytes stored from `data_offset`, before block padding. Always zero
    /// for links, directories, devices and FIFOs.
    pub stored_size: u64,

    pub sparse: Option<Vec<SparseChunk>>,

    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    /// Whole seconds since the epoch; negative before 1970.
    pub mtime: i64,
    pub uname: Option<Vec<u8>>,
    pub gname: Option<Vec<u8>>,
}

impl TarEntry {
    #[must_use]
    pub fn path_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }

    #[must_use]
    pub fn link_target_lossy(&self) -> Option<Cow<'_, str>> {
        self.link_target.as_deref().map(String::from_utf8_lossy)
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.entry_type.is_symlink()
    }

    #[must_use]
    pub fn is_hard_link(&self) -> bool {
        self.entry_type.is_hard_link()
    }

    #[must_use]
    pub fn is_sparse(&self) -> bool {
        self.sparse.is_some()
    }

    /// Where the next member group starts, past this one's padded content.
    /// `None` on overflow.
    #[must_use]
    pub fn next_header_offset(&self) -> Option<u64> {
        let padded = self.stored_size.checked_next_multiple_of(BLOCK_SIZE)?;
        self.data_offset.checked_add(padded)
    }
}
