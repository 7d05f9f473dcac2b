use std::io::Read;

use super::decode::decode_next;
use super::entry::TarEntry;
use super::error::{Result, StreamError};
use super::limits::Limits;
use super::source::{BlockSource, Sequential};

/// Walks an archive front to back, one [`TarEntry`] per member.
///
/// `L`, `K` and `x` entries are folded into the member after them and `g`
/// entries are passed over. Member content is never returned; the next call
/// skips it. An old GNU sparse (`S`) member stops the walk with
/// [`StreamError::UnsupportedSparse`].
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use tar_header::stream::{Limits, TarStreamParser};
///
/// let file = BufReader::new(File::open("archive.tar").unwrap());
/// for entry in TarStreamParser::new(file, Limits::default()) {
///     let entry = entry.unwrap();
///     println!("{} at {}", entry.path_lossy(), entry.data_offset);
/// }
/// ```
#[derive(Debug)]
pub struct TarStreamParser<R> {
    source: Sequential<R>,
    limits: Limits,
    next_header: u64,
    finished: bool,
}

impl<R: Read> TarStreamParser<R> {
    pub fn new(reader: R, limits: Limits) -> Self {
        Self {
            source: Sequential::new(reader),
            limits,
            next_header: 0,
            finished: false,
        }
    }

    /// Bytes taken from the reader so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// The next member, or `None` at the end-of-archive marker or at end of
    /// input on a block boundary.
    ///
    /// The first error ends the walk: later calls return `Ok(None)`.
    pub fn next_entry(&mut self) -> Result<Option<TarEntry>> {
        if self.finished {
            return Ok(None);
        }
        let next = self.step();
        self.finished = !matches!(next, Ok(Some(_)));
        next
    }

    fn step(&mut self) -> Result<Option<TarEntry>> {
        let behind = self.next_header.saturating_sub(self.source.position());
        if behind > 0 {
            self.source.skip(behind)?;
        }
        let Some(entry) = decode_next(&mut self.source, &self.limits)? else {
            return Ok(None);
        };
        self.next_header = entry
            .next_header_offset()
            .ok_or(StreamError::InvalidSize(entry.stored_size))?;
        Ok(Some(entry))
    }
}

impl<R: Read> Iterator for TarStreamParser<R> {
    type Item = Result<TarEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
