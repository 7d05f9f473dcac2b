//! Readers bounded to one member's bytes inside a shard.

use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::member::SparseRange;
use crate::pread::{seek_offset, ShardSource};

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "shard ends inside member data")
}

fn seek_within(pos: u64, len: u64, target: SeekFrom) -> io::Result<u64> {
    match target {
        SeekFrom::Start(offset) => Ok(offset),
        SeekFrom::Current(delta) => seek_offset(pos, delta),
        SeekFrom::End(delta) => seek_offset(len, delta),
    }
}

/// The contiguous range `[start, start + len)` of a shard.
///
/// Reads never cross the end of the range. Seeking past the end is allowed
/// and reads there return nothing.
pub struct SectionReader {
    source: Arc<dyn ShardSource>,
    start: u64,
    len: u64,
    pos: u64,
}

impl SectionReader {
    /// A reader over `len` bytes of `source` from `start`.
    pub fn new(source: Arc<dyn ShardSource>, start: u64, len: u64) -> Self {
        Self {
            source,
            start,
            len,
            pos: 0,
        }
    }

    /// Length of the section.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the section is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for SectionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionReader")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

impl Read for SectionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        if want == 0 {
            return Ok(0);
        }
        let n = self.source.read_at(&mut buf[..want], self.start + self.pos)?;
        if n == 0 {
            return Err(truncated());
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SectionReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.pos = seek_within(self.pos, self.len, target)?;
        Ok(self.pos)
    }
}

/// A sparse member expanded to its logical size.
///
/// Bytes inside a stored range come from the shard; stored ranges are laid
/// out back to back from the data offset. Everything else reads as zero.
pub struct SparseReader {
    source: Arc<dyn ShardSource>,
    data_offset: u64,
    /// Stored ranges with the shard offset of each.
    ranges: Vec<(SparseRange, u64)>,
    size: u64,
    pos: u64,
}

impl SparseReader {
    /// Expand the member whose stored ranges start at `data_offset`.
    pub fn new(
        source: Arc<dyn ShardSource>,
        data_offset: u64,
        map: &[SparseRange],
        size: u64,
    ) -> Self {
        let mut stored = data_offset;
        let ranges = map
            .iter()
            .map(|range| {
                let at = stored;
                stored += range.length;
                (*range, at)
            })
            .collect();
        Self {
            source,
            data_offset,
            ranges,
            size,
            pos: 0,
        }
    }

    /// Logical size of the member.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Whether the member is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl std::fmt::Debug for SparseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseReader")
            .field("data_offset", &self.data_offset)
            .field("ranges", &self.ranges.len())
            .field("size", &self.size)
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

impl Read for SparseReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let limit = |end: u64| {
            let span = end.min(self.size) - self.pos;
            usize::try_from(span).map_or(buf.len(), |s| s.min(buf.len()))
        };

        // first range that ends after pos
        let idx = self
            .ranges
            .partition_point(|(range, _)| range.offset + range.length <= self.pos);
        let n = match self.ranges.get(idx) {
            Some((range, stored)) if range.offset <= self.pos => {
                let want = limit(range.offset + range.length);
                let at = stored + (self.pos - range.offset);
                let n = self.source.read_at(&mut buf[..want], at)?;
                if n == 0 {
                    return Err(truncated());
                }
                n
            }
            next => {
                let hole_end = next.map_or(self.size, |(range, _)| range.offset);
                let n = limit(hole_end);
                buf[..n].fill(0);
                n
            }
        };
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SparseReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        self.pos = seek_within(self.pos, self.size, target)?;
        Ok(self.pos)
    }
}

/// The unbuffered bytes of a member.
#[derive(Debug)]
pub enum MemberBody {
    /// Stored contiguously.
    Plain(SectionReader),
    /// Stored as a sparse map.
    Sparse(SparseReader),
}

impl MemberBody {
    /// Logical size of the member.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            MemberBody::Plain(r) => r.len(),
            MemberBody::Sparse(r) => r.len(),
        }
    }
}

impl Read for MemberBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MemberBody::Plain(r) => r.read(buf),
            MemberBody::Sparse(r) => r.read(buf),
        }
    }
}

impl Seek for MemberBody {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        match self {
            MemberBody::Plain(r) => r.seek(target),
            MemberBody::Sparse(r) => r.seek(target),
        }
    }
}

/// A reader for one member's content.
///
/// Members of shards the archive opened itself come back buffered, and the
/// [`MemberReader::Buffered`] variant gives access to
/// [`BufRead`](std::io::BufRead). Members of caller-supplied shards are
/// passed through unbuffered.
#[derive(Debug)]
pub enum MemberReader {
    /// Direct reads against the shard.
    Unbuffered(MemberBody),
    /// Reads through a read-ahead buffer.
    Buffered(BufReader<MemberBody>),
}

impl MemberReader {
    pub(crate) fn new(body: MemberBody, buffer_capacity: Option<usize>) -> Self {
        match buffer_capacity {
            Some(capacity) if capacity > 0 => {
                MemberReader::Buffered(BufReader::with_capacity(capacity, body))
            }
            _ => MemberReader::Unbuffered(body),
        }
    }

    /// Logical size of the member.
    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            MemberReader::Unbuffered(body) => body.size(),
            MemberReader::Buffered(reader) => reader.get_ref().size(),
        }
    }

    /// Whether reads go through a read-ahead buffer.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        matches!(self, MemberReader::Buffered(_))
    }

    /// Read the whole member from the current position.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(usize::try_from(self.size()).unwrap_or(0));
        self.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl Read for MemberReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MemberReader::Unbuffered(body) => body.read(buf),
            MemberReader::Buffered(reader) => reader.read(buf),
        }
    }
}

impl Seek for MemberReader {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        match self {
            MemberReader::Unbuffered(body) => body.seek(target),
            MemberReader::Buffered(reader) => reader.seek(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(bytes: &[u8]) -> Arc<dyn ShardSource> {
        Arc::new(bytes.to_vec())
    }

    #[test]
    fn test_section_is_bounded() {
        let mut reader = SectionReader::new(source(b"xxhello worldyy"), 2, 11);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");

        reader.seek(SeekFrom::End(-5)).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"world");

        reader.seek(SeekFrom::Start(100)).unwrap();
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(reader.seek(SeekFrom::Current(-200)).is_err());
    }

    #[test]
    fn test_section_past_shard_end() {
        let mut reader = SectionReader::new(source(b"abc"), 1, 10);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"bc");
    }

    #[test]
    fn test_sparse_expands_holes() {
        // stored: "AAA" for [2, 5), "BB" for [8, 10); logical size 12
        let map = [
            SparseRange { offset: 2, length: 3 },
            SparseRange { offset: 8, length: 2 },
        ];
        let mut reader = SparseReader::new(source(b"hdrAAABBtrailer"), 3, &map, 12);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"\0\0AAA\0\0\0BB\0\0");

        reader.seek(SeekFrom::Start(4)).unwrap();
        let mut buf = [0xffu8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"A\0\0\0B");
    }

    #[test]
    fn test_member_reader_buffering() {
        let body = MemberBody::Plain(SectionReader::new(source(b"0123456789"), 0, 10));
        let mut reader = MemberReader::new(body, Some(4));
        assert!(reader.is_buffered());
        assert_eq!(reader.size(), 10);
        reader.seek(SeekFrom::Start(3)).unwrap();
        assert_eq!(reader.read_all().unwrap(), b"3456789");

        let body = MemberBody::Plain(SectionReader::new(source(b"0123456789"), 0, 10));
        assert!(!MemberReader::new(body, Some(0)).is_buffered());
    }
}
