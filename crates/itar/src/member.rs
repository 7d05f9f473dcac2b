//! Index records for archive members.

use std::fmt;

use serde::{Deserialize, Serialize};
use tar_header::sparse::SparseChunk;
use tar_header::stream::TarEntry;
use tar_header::EntryType;

/// What a member resolves to: stored bytes, or another member's name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payload {
    /// Logical size of the member's content.
    Size(u64),
    /// Name of the member a symbolic or hard link points at, looked up when
    /// the link is opened.
    Target(String),
}

impl Payload {
    /// The size, if this is not a link.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match self {
            Payload::Size(size) => Some(*size),
            Payload::Target(_) => None,
        }
    }

    /// The link target, if this is a link.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Payload::Size(_) => None,
            Payload::Target(target) => Some(target),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Size(size) => write!(f, "{size}"),
            Payload::Target(target) => f.write_str(target),
        }
    }
}

/// One stored region of a sparse member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SparseRange {
    /// Logical offset in the expanded member.
    pub offset: u64,
    /// Stored length.
    pub length: u64,
}

impl From<SparseChunk> for SparseRange {
    fn from(chunk: SparseChunk) -> Self {
        Self {
            offset: chunk.offset,
            length: chunk.length,
        }
    }
}

/// Where a member lives inside its shard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Offset of the member's first header block.
    pub header_offset: u64,
    /// Offset of the member's content.
    pub data_offset: u64,
    /// Size or link target.
    pub payload: Payload,
    /// Stored regions of a sparse member; `None` means contiguous.
    pub sparse: Option<Vec<SparseRange>>,
}

impl MemberRecord {
    /// Derive the record for a decoded entry.
    ///
    /// Symbolic links store their target joined onto the link's own
    /// directory, without normalising `.`, `..` or absolute targets. Hard
    /// links store their raw target.
    #[must_use]
    pub fn from_entry(entry: &TarEntry) -> Self {
        let link = || entry.link_target_lossy().unwrap_or_default().into_owned();
        let payload = match entry.entry_type {
            EntryType::Symlink => Payload::Target(symlink_target(&entry.path_lossy(), &link())),
            EntryType::Link => Payload::Target(link()),
            _ => Payload::Size(entry.size),
        };
        Self {
            header_offset: entry.header_offset,
            data_offset: entry.data_offset,
            payload,
            sparse: entry
                .sparse
                .as_ref()
                .map(|chunks| chunks.iter().copied().map(SparseRange::from).collect()),
        }
    }

    /// Whether this record is a symbolic or hard link.
    #[must_use]
    pub fn is_link(&self) -> bool {
        matches!(self.payload, Payload::Target(_))
    }

    /// Whether the member has a sparse map.
    #[must_use]
    pub fn is_sparse(&self) -> bool {
        self.sparse.is_some()
    }

    pub(crate) fn summary(&self, name: &str) -> RecordSummary {
        RecordSummary {
            name: name.to_owned(),
            header_offset: self.header_offset,
            data_offset: self.data_offset,
            payload: self.payload.clone(),
            sparse: self.is_sparse(),
        }
    }
}

/// A member's entry in the global index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Owning shard; `None` for a single unsharded archive.
    pub shard_id: Option<u32>,
    /// Location within that shard.
    pub record: MemberRecord,
}

/// The fields compared when verifying a record against its shard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordSummary {
    /// Member name.
    pub name: String,
    /// Offset of the first header block.
    pub header_offset: u64,
    /// Offset of the content.
    pub data_offset: u64,
    /// Size or link target.
    pub payload: Payload,
    /// Whether a sparse map is present.
    pub sparse: bool,
}

impl fmt::Display for RecordSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.name, self.header_offset, self.data_offset, self.payload, self.sparse
        )
    }
}

/// Join a symlink's raw target onto the directory containing the link.
///
/// Empty components are skipped, so a link at the archive root stores its
/// target unchanged.
#[must_use]
pub fn symlink_target(link_name: &str, target: &str) -> String {
    let dir = dirname(link_name);
    match (dir.is_empty(), target.is_empty()) {
        (true, _) => target.to_owned(),
        (false, true) => dir.to_owned(),
        (false, false) => format!("{dir}/{target}"),
    }
}

/// Everything before the last `/`, with trailing slashes removed unless
/// the result is made of slashes only.
fn dirname(path: &str) -> &str {
    let Some(i) = path.rfind('/') else {
        return "";
    };
    let head = &path[..=i];
    if head.bytes().all(|b| b == b'/') {
        head
    } else {
        head.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("file"), "");
        assert_eq!(dirname("a/b/c"), "a/b");
        assert_eq!(dirname("a//b"), "a");
        assert_eq!(dirname("/x"), "/");
        assert_eq!(dirname("dir/"), "dir");
    }

    #[test]
    fn test_symlink_target_is_not_normalised() {
        assert_eq!(symlink_target("link1.txt", "file1.txt"), "file1.txt");
        assert_eq!(symlink_target("crosslink.txt", "../file1.txt"), "../file1.txt");
        assert_eq!(symlink_target("a/b/link", "../c"), "a/b/../c");
        assert_eq!(symlink_target("a/link", "./c"), "a/./c");
        assert_eq!(symlink_target("a/link", "/etc/passwd"), "a//etc/passwd");
        assert_eq!(symlink_target("a/link", ""), "a");
    }

    #[test]
    fn test_summary_display() {
        let record = MemberRecord {
            header_offset: 0,
            data_offset: 512,
            payload: Payload::Size(13),
            sparse: None,
        };
        assert_eq!(record.summary("hello.txt").to_string(), "(hello.txt, 0, 512, 13, false)");

        let link = MemberRecord {
            payload: Payload::Target("a/b".into()),
            ..record
        };
        assert!(link.is_link());
        assert_eq!(link.payload.size(), None);
        assert_eq!(link.summary("l").to_string(), "(l, 0, 512, a/b, false)");
    }
}
