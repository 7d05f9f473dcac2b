//! The 512-byte header block.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::numeric::{parse_numeric, parse_octal, parse_signed_numeric, truncate_null};
use crate::{HeaderError, Result, HEADER_SIZE};

const USTAR_MAGIC: [u8; 8] = *b"ustar\x0000";
const GNU_MAGIC: [u8; 8] = *b"ustar  \0";

/// Which header layout a block follows, from its magic and version fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Pre-POSIX v7 header: no owner names, no prefix.
    V7,
    /// POSIX ustar, `"ustar\0"` + `"00"`.
    Ustar,
    /// GNU, `"ustar "` + `" \0"`. The prefix area holds GNU-only fields.
    Gnu,
}

/// What a header describes.
///
/// The GNU long-name, long-link and PAX kinds are metadata for the entry
/// that follows them rather than members of their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// `'0'`, or NUL in pre-POSIX archives.
    Regular,
    /// `'1'`: hard link to an earlier member.
    Link,
    /// `'2'`
    Symlink,
    /// `'3'`
    Char,
    /// `'4'`
    Block,
    /// `'5'`
    Directory,
    /// `'6'`
    Fifo,
    /// `'7'`: treated as a regular file.
    Continuous,
    /// `'L'`: the next entry's name.
    GnuLongName,
    /// `'K'`: the next entry's link target.
    GnuLongLink,
    /// `'S'`: sparse map kept in the header itself.
    GnuSparse,
    /// `'x'`: PAX records for the next entry.
    XHeader,
    /// `'g'`: PAX records for the rest of the archive.
    XGlobalHeader,
    /// Anything else.
    Other(u8),
}

impl From<u8> for EntryType {
    fn from(flag: u8) -> Self {
        match flag {
            b'0' | 0 => Self::Regular,
            b'1' => Self::Link,
            b'2' => Self::Symlink,
            b'3' => Self::Char,
            b'4' => Self::Block,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            b'7' => Self::Continuous,
            b'L' => Self::GnuLongName,
            b'K' => Self::GnuLongLink,
            b'S' => Self::GnuSparse,
            // Solaris writes `X` for the same records
            b'x' | b'X' => Self::XHeader,
            b'g' => Self::XGlobalHeader,
            other => Self::Other(other),
        }
    }
}

impl EntryType {
    /// The type flag byte. [`Regular`](Self::Regular) maps to `'0'`.
    #[must_use]
    pub fn flag(self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::Link => b'1',
            Self::Symlink => b'2',
            Self::Char => b'3',
            Self::Block => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::Continuous => b'7',
            Self::GnuLongName => b'L',
            Self::GnuLongLink => b'K',
            Self::GnuSparse => b'S',
            Self::XHeader => b'x',
            Self::XGlobalHeader => b'g',
            Self::Other(flag) => flag,
        }
    }

    /// Whether the header only carries metadata for a later entry.
    #[must_use]
    pub fn is_metadata(self) -> bool {
        matches!(
            self,
            Self::GnuLongName | Self::GnuLongLink | Self::XHeader | Self::XGlobalHeader
        )
    }

    #[must_use]
    pub fn is_file(self) -> bool {
        matches!(self, Self::Regular | Self::Continuous)
    }

    #[must_use]
    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }

    #[must_use]
    pub fn is_symlink(self) -> bool {
        self == Self::Symlink
    }

    #[must_use]
    pub fn is_hard_link(self) -> bool {
        self == Self::Link
    }

    /// Whether the size field counts content blocks after the header.
    /// Links, directories, devices and FIFOs never have any, whatever their
    /// size field says.
    #[must_use]
    pub fn has_data(self) -> bool {
        !matches!(
            self,
            Self::Link | Self::Symlink | Self::Char | Self::Block | Self::Directory | Self::Fifo
        )
    }
}

/// A tar header block, viewed field by field.
///
/// The layout is the ustar one; v7 and GNU headers share the first 257
/// bytes and differ only in what the rest means. Numeric fields are decoded
/// on access, so a `Header` can hold any 512 bytes.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Header {
    name: [u8; 100],
    mode: [u8; 8],
    uid: [u8; 8],
    gid: [u8; 8],
    size: [u8; 12],
    mtime: [u8; 12],
    checksum: [u8; 8],
    typeflag: u8,
    linkname: [u8; 100],
    magic: [u8; 8],
    uname: [u8; 32],
    gname: [u8; 32],
    devmajor: [u8; 8],
    devminor: [u8; 8],
    prefix: [u8; 155],
    _padding: [u8; 12],
}

impl Header {
    /// View the start of `bytes` as a header.
    ///
    /// # Errors
    ///
    /// [`HeaderError::InsufficientData`] if fewer than 512 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Header> {
        Header::ref_from_prefix(bytes)
            .map(|(header, _)| header)
            .map_err(|_| HeaderError::InsufficientData(bytes.len()))
    }

    /// View a whole block as a header.
    #[must_use]
    pub fn from_bytes_exact(block: &[u8; HEADER_SIZE]) -> &Header {
        zerocopy::transmute_ref!(block)
    }

    /// The layout this header follows.
    #[must_use]
    pub fn format(&self) -> Format {
        match self.magic {
            USTAR_MAGIC => Format::Ustar,
            GNU_MAGIC => Format::Gnu,
            _ => Format::V7,
        }
    }

    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        EntryType::from(self.typeflag)
    }

    /// Number of content bytes that follow the header in the archive.
    pub fn entry_size(&self) -> Result<u64> {
        parse_numeric(&self.size)
    }

    pub fn mode(&self) -> Result<u32> {
        let mode = parse_numeric(&self.mode)?;
        u32::try_from(mode).map_err(|_| HeaderError::InvalidNumeric(self.mode.to_vec()))
    }

    pub fn uid(&self) -> Result<u64> {
        parse_numeric(&self.uid)
    }

    pub fn gid(&self) -> Result<u64> {
        parse_numeric(&self.gid)
    }

    /// Modification time in seconds since the epoch; negative before 1970.
    pub fn mtime(&self) -> Result<i64> {
        parse_signed_numeric(&self.mtime)
    }

    /// Major and minor numbers of a character or block device.
    pub fn device(&self) -> Result<Option<(u64, u64)>> {
        if !matches!(self.entry_type(), EntryType::Char | EntryType::Block) {
            return Ok(None);
        }
        Ok(Some((
            parse_numeric(&self.devmajor)?,
            parse_numeric(&self.devminor)?,
        )))
    }

    /// The name field alone, without any ustar prefix.
    #[must_use]
    pub fn path_bytes(&self) -> &[u8] {
        truncate_null(&self.name)
    }

    #[must_use]
    pub fn link_name_bytes(&self) -> &[u8] {
        truncate_null(&self.linkname)
    }

    /// Owner name; v7 headers have none.
    #[must_use]
    pub fn username(&self) -> Option<&[u8]> {
        (self.format() != Format::V7).then(|| truncate_null(&self.uname))
    }

    /// Group name; v7 headers have none.
    #[must_use]
    pub fn groupname(&self) -> Option<&[u8]> {
        (self.format() != Format::V7).then(|| truncate_null(&self.gname))
    }

    /// The ustar path prefix. Only ustar headers have one.
    #[must_use]
    pub fn prefix(&self) -> Option<&[u8]> {
        (self.format() == Format::Ustar).then(|| truncate_null(&self.prefix))
    }

    /// The member name as far as this header alone can tell: the ustar
    /// prefix and the name field joined with `/`.
    #[must_use]
    pub fn full_path(&self) -> Vec<u8> {
        let name = self.path_bytes();
        match self.prefix() {
            Some(prefix) if !prefix.is_empty() => [prefix, b"/".as_slice(), name].concat(),
            _ => name.to_vec(),
        }
    }

    /// Unsigned sum of the block with the checksum field read as spaces.
    #[must_use]
    pub fn compute_checksum(&self) -> u64 {
        let sum = |bytes: &[u8]| bytes.iter().map(|&b| u64::from(b)).sum::<u64>();
        sum(self.as_bytes()) - sum(&self.checksum) + 8 * u64::from(b' ')
    }

    /// The same sum over bytes read as `i8`. Some old writers stored this
    /// one, which differs once a name has non-ASCII bytes.
    #[must_use]
    pub fn compute_signed_checksum(&self) -> i64 {
        let sum = |bytes: &[u8]| {
            bytes
                .iter()
                .map(|&b| i64::from(i8::from_ne_bytes([b])))
                .sum::<i64>()
        };
        sum(self.as_bytes()) - sum(&self.checksum) + 8 * i64::from(b' ')
    }

    /// Compare the stored checksum with both the unsigned and the signed sum.
    pub fn verify_checksum(&self) -> Result<()> {
        let expected = parse_octal(&self.checksum)?;
        let computed = self.compute_checksum();
        let signed_match =
            i64::try_from(expected).is_ok_and(|e| e == self.compute_signed_checksum());
        if expected != computed && !signed_match {
            return Err(HeaderError::ChecksumMismatch { expected, computed });
        }
        Ok(())
    }

    /// Whether every byte is zero, as in the end-of-archive marker.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("format", &self.format())
            .field("entry_type", &self.entry_type())
            .field("path", &String::from_utf8_lossy(&self.full_path()))
            .field("size", &self.entry_size().ok())
            .finish_non_exhaustive()
    }
}
