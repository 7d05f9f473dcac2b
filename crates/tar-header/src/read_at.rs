//! Positional reads.

use std::io;
use std::sync::Arc;

/// Bytes addressable by offset.
///
/// A read names its own offset, so implementors keep no cursor and two reads
/// at different offsets never disturb each other.
pub trait ReadAt {
    /// Copy bytes starting at `offset` into `buf`, returning the count.
    /// Zero means `offset` is at or past the end.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Fill all of `buf` from `offset`.
    ///
    /// `Ok(false)` means nothing at all was available. Running out part way
    /// through is an [`io::ErrorKind::UnexpectedEof`] error.
    fn read_exactish_at(&self, buf: &mut [u8], offset: u64) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            let at = offset + filled as u64;
            match self.read_at(&mut buf[filled..], at) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Fill all of `buf` from `offset`. Any shortfall is `UnexpectedEof`.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        match self.read_exactish_at(buf, offset)? {
            true => Ok(()),
            false if buf.is_empty() => Ok(()),
            false => Err(io::ErrorKind::UnexpectedEof.into()),
        }
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let tail = usize::try_from(offset)
            .ok()
            .and_then(|start| self.get(start..))
            .unwrap_or_default();
        let n = tail.len().min(buf.len());
        buf[..n].copy_from_slice(&tail[..n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

macro_rules! forward_read_at {
    ($($ptr:ty),*) => {$(
        impl<T: ReadAt + ?Sized> ReadAt for $ptr {
            fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
                (**self).read_at(buf, offset)
            }
        }
    )*};
}

forward_read_at!(&T, Box<T>, Arc<T>);
