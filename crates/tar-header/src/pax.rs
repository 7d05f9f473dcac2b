//! PAX extended header records.
//!
//! A PAX `x` or `g` entry's content is a run of `"<len> <key>=<value>\n"`
//! records, where `<len>` is the decimal length of the whole record,
//! itself included.

use std::str::{self, Utf8Error};

use thiserror::Error;

pub const PAX_PATH: &str = "path";
pub const PAX_LINKPATH: &str = "linkpath";
pub const PAX_SIZE: &str = "size";
pub const PAX_UID: &str = "uid";
pub const PAX_GID: &str = "gid";
pub const PAX_UNAME: &str = "uname";
pub const PAX_GNAME: &str = "gname";
pub const PAX_MTIME: &str = "mtime";

/// Sparse format version, `1` for the 1.0 format.
pub const PAX_GNU_SPARSE_MAJOR: &str = "GNU.sparse.major";
pub const PAX_GNU_SPARSE_MINOR: &str = "GNU.sparse.minor";
/// Real name of a sparse member, stored under a placeholder name.
pub const PAX_GNU_SPARSE_NAME: &str = "GNU.sparse.name";
/// Expanded size, formats 0.0 and 0.1.
pub const PAX_GNU_SPARSE_SIZE: &str = "GNU.sparse.size";
/// Expanded size, format 1.0.
pub const PAX_GNU_SPARSE_REALSIZE: &str = "GNU.sparse.realsize";
pub const PAX_GNU_SPARSE_NUMBLOCKS: &str = "GNU.sparse.numblocks";
/// Repeated once per chunk in format 0.0, paired with the next numbytes.
pub const PAX_GNU_SPARSE_OFFSET: &str = "GNU.sparse.offset";
pub const PAX_GNU_SPARSE_NUMBYTES: &str = "GNU.sparse.numbytes";
/// `offset,length,...` in format 0.1.
pub const PAX_GNU_SPARSE_MAP: &str = "GNU.sparse.map";

/// A record that could not be parsed.
#[derive(Debug, Error)]
pub enum PaxError {
    /// Bad length prefix, missing `=`, or missing trailing newline.
    #[error("malformed PAX record")]
    Malformed,
    /// The key is not UTF-8.
    #[error("PAX key is not UTF-8: {0}")]
    InvalidKey(#[from] Utf8Error),
}

/// One `key=value` record.
#[derive(Debug, Clone, Copy)]
pub struct PaxExtension<'a> {
    key: &'a [u8],
    value: &'a [u8],
}

impl<'a> PaxExtension<'a> {
    pub fn key(&self) -> Result<&'a str, Utf8Error> {
        str::from_utf8(self.key)
    }

    pub fn value(&self) -> Result<&'a str, Utf8Error> {
        str::from_utf8(self.value)
    }

    /// The value as stored. Paths need not be UTF-8.
    #[must_use]
    pub fn value_bytes(&self) -> &'a [u8] {
        self.value
    }

    /// The value as a decimal integer, surrounding whitespace ignored.
    #[must_use]
    pub fn value_u64(&self) -> Option<u64> {
        self.value().ok()?.trim().parse().ok()
    }
}

/// Iterator over the records of a PAX header's content.
///
/// Iteration stops at the end of the data or at NUL padding. After a
/// malformed record it yields nothing more.
///
/// ```
/// use tar_header::PaxExtensions;
///
/// let mut records = PaxExtensions::new(b"16 path=a/b.txt\n");
/// let record = records.next().unwrap().unwrap();
/// assert_eq!(record.key().unwrap(), "path");
/// assert_eq!(record.value().unwrap(), "a/b.txt");
/// assert!(records.next().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct PaxExtensions<'a> {
    rest: &'a [u8],
}

impl<'a> PaxExtensions<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }

    /// The value of the last well-formed record for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.clone()
            .map_while(Result::ok)
            .filter(|ext| ext.key() == Ok(key))
            .last()?
            .value()
            .ok()
    }

    fn split_record(&self) -> Option<(&'a [u8], &'a [u8])> {
        let space = self.rest.iter().position(|&b| b == b' ')?;
        let len: usize = str::from_utf8(&self.rest[..space]).ok()?.parse().ok()?;
        if len <= space + 1 || len > self.rest.len() {
            return None;
        }
        let (record, rest) = self.rest.split_at(len);
        let body = record[space + 1..].strip_suffix(b"\n")?;
        Some((body, rest))
    }
}

impl<'a> Iterator for PaxExtensions<'a> {
    type Item = Result<PaxExtension<'a>, PaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.rest.first(), None | Some(0)) {
            return None;
        }
        let Some((body, rest)) = self.split_record() else {
            self.rest = &[];
            return Some(Err(PaxError::Malformed));
        };
        self.rest = rest;
        let Some(eq) = body.iter().position(|&b| b == b'=') else {
            return Some(Err(PaxError::Malformed));
        };
        Some(Ok(PaxExtension {
            key: &body[..eq],
            value: &body[eq + 1..],
        }))
    }
}
