//! File handles for shard reads.
//!
//! Member readers never share a cursor: each keeps its own logical position
//! and asks the shard handle for bytes at an explicit offset through
//! [`ReadAt`]. Whether that is actually safe under concurrency depends on
//! the handle:
//!
//! - [`PositionalFile`] uses `pread(2)`, which takes the offset as an
//!   argument and leaves the file description's offset alone. Any number of
//!   threads can read through one handle.
//! - [`SeekingFile`] seeks the shared file description and then reads.
//!   Another thread can move the offset between the two calls, so
//!   concurrent readers may get each other's bytes. Use it only from one
//!   thread at a time.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use tar_header::ReadAt;

/// A shard byte source that can be shared between readers.
pub trait ShardSource: ReadAt + Send + Sync {}

impl<T: ReadAt + Send + Sync + ?Sized> ShardSource for T {}

/// A file read with `pread(2)`; safe to share between threads.
#[derive(Debug)]
pub struct PositionalFile {
    file: File,
}

impl PositionalFile {
    /// Open `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        File::open(path).map(Self::new)
    }

    /// Wrap an already open file.
    #[must_use]
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Length of the file in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Give back the file.
    #[must_use]
    pub fn into_inner(self) -> File {
        self.file
    }
}

impl ReadAt for PositionalFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Ok(rustix::io::pread(&self.file, buf, offset)?)
    }
}

/// A file read by seeking its shared offset and then reading.
///
/// This is how a plain file handle behaves. Two threads reading through
/// the same `SeekingFile` can observe each other's seeks.
#[derive(Debug)]
pub struct SeekingFile {
    file: File,
}

impl SeekingFile {
    /// Open `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        File::open(path).map(Self::new)
    }

    /// Wrap an already open file.
    #[must_use]
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl ReadAt for SeekingFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }
}

/// A `Read + Seek` cursor over a [`ReadAt`] source.
///
/// The cursor position belongs to this value alone; reads go through
/// [`ReadAt::read_at`] at that position.
#[derive(Debug)]
pub struct PositionalReader<S> {
    source: S,
    pos: u64,
    len: Option<u64>,
}

impl<S: ReadAt> PositionalReader<S> {
    /// A cursor at offset zero. Without a known length, seeking relative to
    /// the end fails.
    pub fn new(source: S) -> Self {
        Self {
            source,
            pos: 0,
            len: None,
        }
    }

    /// A cursor over a source of known length.
    pub fn with_len(source: S, len: u64) -> Self {
        Self {
            source,
            pos: 0,
            len: Some(len),
        }
    }

    /// The wrapped source.
    pub fn get_ref(&self) -> &S {
        &self.source
    }
}

impl<S: ReadAt> Read for PositionalReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: ReadAt> Seek for PositionalReader<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.pos = offset;
                return Ok(offset);
            }
            SeekFrom::Current(delta) => (self.pos, delta),
            SeekFrom::End(delta) => {
                let len = self.len.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "length of source is unknown")
                })?;
                (len, delta)
            }
        };
        self.pos = seek_offset(base, delta)?;
        Ok(self.pos)
    }
}

/// Apply a signed seek delta, rejecting positions before zero.
pub(crate) fn seek_offset(base: u64, delta: i64) -> io::Result<u64> {
    base.checked_add_signed(delta).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}
