//! Block sources the decoder pulls from: a forward-only stream, or
//! positional reads against a [`ReadAt`] value.

use std::io::{self, Read};

use crate::ReadAt;

use super::error::{Result, StreamError};

pub(crate) trait BlockSource {
    /// Offset of the next byte this source will produce.
    fn position(&self) -> u64;

    /// Fill `buf` completely. `Ok(false)` means a clean end of input before
    /// the first byte; a partial fill is an `UnexpectedEof` I/O error.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<bool>;

    /// Advance past `len` bytes without returning them.
    fn skip(&mut self, len: u64) -> Result<()>;

    /// Like [`fill`](Self::fill), but any end of input is an error.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let pos = self.position();
        match self.fill(buf) {
            Ok(true) => Ok(()),
            Ok(false) => Err(StreamError::UnexpectedEof { pos }),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(StreamError::UnexpectedEof { pos })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read a header block, distinguishing a clean end of input.
    fn read_block(&mut self, buf: &mut [u8]) -> Result<bool> {
        let pos = self.position();
        match self.fill(buf) {
            Ok(filled) => Ok(filled),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(StreamError::UnexpectedEof { pos })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// A forward-only reader with a running offset.
#[derive(Debug)]
pub(crate) struct Sequential<R> {
    reader: R,
    pos: u64,
}

impl<R: Read> Sequential<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self { reader, pos: 0 }
    }
}

impl<R: Read> BlockSource for Sequential<R> {
    fn position(&self) -> u64 {
        self.pos
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut done = 0;
        while done < buf.len() {
            match self.reader.read(&mut buf[done..]) {
                Ok(0) if done == 0 => return Ok(false),
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => {
                    done += n;
                    self.pos += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    fn skip(&mut self, len: u64) -> Result<()> {
        let copied = io::copy(&mut (&mut self.reader).take(len), &mut io::sink())?;
        self.pos += copied;
        if copied < len {
            return Err(StreamError::UnexpectedEof { pos: self.pos });
        }
        Ok(())
    }
}

/// Positional reads with a private cursor; the source itself is never moved.
#[derive(Debug)]
pub(crate) struct Positional<'a, S: ?Sized> {
    source: &'a S,
    pos: u64,
}

impl<'a, S: ReadAt + ?Sized> Positional<'a, S> {
    pub(crate) fn new(source: &'a S, pos: u64) -> Self {
        Self { source, pos }
    }
}

impl<S: ReadAt + ?Sized> BlockSource for Positional<'_, S> {
    fn position(&self) -> u64 {
        self.pos
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let filled = self.source.read_exactish_at(buf, self.pos)?;
        if filled {
            self.pos += buf.len() as u64;
        }
        Ok(filled)
    }

    fn skip(&mut self, len: u64) -> Result<()> {
        self.pos = self
            .pos
            .checked_add(len)
            .ok_or(StreamError::InvalidSize(len))?;
        Ok(())
    }
}
