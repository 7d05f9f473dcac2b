//! PAX encodings of GNU sparse files.
//!
//! GNU tar records sparse files in PAX archives in three ways:
//!
//! - **0.0**: repeated `GNU.sparse.offset` / `GNU.sparse.numbytes` records.
//! - **0.1**: a single `GNU.sparse.map` record, `offset,length,offset,length,...`.
//! - **1.0**: `GNU.sparse.major=1`, `GNU.sparse.minor=0`; the map is stored at
//!   the start of the member data as newline-terminated decimals, padded to a
//!   block boundary. The first number is the chunk count.
//!
//! In all three the stored data is the concatenation of the chunks, and the
//! expanded file size comes from `GNU.sparse.size` or `GNU.sparse.realsize`.
//! The legacy GNU header map (type `S`) is not handled here.

use thiserror::Error;

use crate::{
    PaxExtension, PAX_GNU_SPARSE_MAJOR, PAX_GNU_SPARSE_MAP, PAX_GNU_SPARSE_MINOR,
    PAX_GNU_SPARSE_NAME, PAX_GNU_SPARSE_NUMBLOCKS, PAX_GNU_SPARSE_NUMBYTES,
    PAX_GNU_SPARSE_OFFSET, PAX_GNU_SPARSE_REALSIZE, PAX_GNU_SPARSE_SIZE,
};

/// Errors in a sparse map.
#[derive(Debug, Error)]
pub enum SparseError {
    /// A number in the map could not be parsed.
    #[error("invalid number in sparse map: {0:?}")]
    InvalidNumber(String),
    /// The map is structurally inconsistent.
    #[error("malformed sparse map: {0}")]
    Malformed(&'static str),
}

/// One stored region of a sparse file: `length` bytes at logical `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SparseChunk {
    /// Logical offset of the region in the expanded file.
    pub offset: u64,
    /// Number of stored bytes in the region.
    pub length: u64,
}

impl SparseChunk {
    /// Logical end of the region.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

/// Which PAX sparse encoding a member uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SparseFormat {
    /// `GNU.sparse.offset` / `GNU.sparse.numbytes` pairs.
    V0_0,
    /// `GNU.sparse.map`.
    V0_1,
    /// Map stored in the data area.
    V1_0,
}

/// Sparse-related PAX records collected for one member.
#[derive(Debug, Default, Clone)]
pub struct SparsePax {
    major: Option<u64>,
    minor: Option<u64>,
    name: Option<Vec<u8>>,
    size: Option<u64>,
    realsize: Option<u64>,
    numblocks: Option<u64>,
    offsets: Vec<u64>,
    numbytes: Vec<u64>,
    map: Option<String>,
}

impl SparsePax {
    /// Record one PAX extension. Returns `false` for keys unrelated to sparse files.
    pub fn record(&mut self, key: &str, ext: &PaxExtension<'_>) -> Result<bool, SparseError> {
        let number = || {
            ext.value_u64().ok_or_else(|| {
                SparseError::InvalidNumber(String::from_utf8_lossy(ext.value_bytes()).into_owned())
            })
        };
        match key {
            PAX_GNU_SPARSE_MAJOR => self.major = Some(number()?),
            PAX_GNU_SPARSE_MINOR => self.minor = Some(number()?),
            PAX_GNU_SPARSE_NAME => self.name = Some(ext.value_bytes().to_vec()),
            PAX_GNU_SPARSE_SIZE => self.size = Some(number()?),
            PAX_GNU_SPARSE_REALSIZE => self.realsize = Some(number()?),
            PAX_GNU_SPARSE_NUMBLOCKS => self.numblocks = Some(number()?),
            PAX_GNU_SPARSE_OFFSET => self.offsets.push(number()?),
            PAX_GNU_SPARSE_NUMBYTES => self.numbytes.push(number()?),
            PAX_GNU_SPARSE_MAP => {
                self.map = Some(String::from_utf8_lossy(ext.value_bytes()).into_owned());
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// The encoding in use, if the member is sparse at all.
    #[must_use]
    pub fn format(&self) -> Option<SparseFormat> {
        if self.map.is_some() {
            Some(SparseFormat::V0_1)
        } else if self.size.is_some() && !self.offsets.is_empty() {
            Some(SparseFormat::V0_0)
        } else if self.major == Some(1) && self.minor == Some(0) {
            Some(SparseFormat::V1_0)
        } else {
            None
        }
    }

    /// Original member name, which replaces the placeholder `GNUSparseFile.N/...` path.
    #[must_use]
    pub fn name(&self) -> Option<&[u8]> {
        self.name.as_deref()
    }

    /// Expanded size of the file.
    pub fn real_size(&self) -> Result<u64, SparseError> {
        self.realsize
            .or(self.size)
            .ok_or(SparseError::Malformed("missing expanded size"))
    }

    /// The chunk list for the 0.x encodings, which carry it in PAX records.
    pub fn inline_map(&self) -> Result<Vec<SparseChunk>, SparseError> {
        let chunks: Vec<SparseChunk> = match self.format() {
            Some(SparseFormat::V0_1) => {
                let map = self.map.as_deref().unwrap_or_default();
                let numbers = if map.is_empty() {
                    Vec::new()
                } else {
                    map.split(',').map(parse_number).collect::<Result<Vec<_>, _>>()?
                };
                if numbers.len() % 2 != 0 {
                    return Err(SparseError::Malformed("odd number of values in GNU.sparse.map"));
                }
                numbers
                    .chunks_exact(2)
                    .map(|pair| SparseChunk {
                        offset: pair[0],
                        length: pair[1],
                    })
                    .collect()
            }
            Some(SparseFormat::V0_0) => {
                if self.offsets.len() != self.numbytes.len() {
                    return Err(SparseError::Malformed("unpaired GNU.sparse.offset/numbytes"));
                }
                self.offsets
                    .iter()
                    .zip(&self.numbytes)
                    .map(|(&offset, &length)| SparseChunk { offset, length })
                    .collect()
            }
            _ => return Err(SparseError::Malformed("map is not stored in PAX records")),
        };
        if let Some(expected) = self.numblocks {
            if expected != chunks.len() as u64 {
                return Err(SparseError::Malformed("GNU.sparse.numblocks disagrees with map"));
            }
        }
        validate(&chunks, self.real_size()?)?;
        Ok(chunks)
    }
}

/// Try to parse a 1.0 sparse map from the leading bytes of a member's data.
///
/// Returns `Ok(None)` when `buf` does not yet hold the complete map and more
/// blocks should be read.
pub fn parse_v1_map(buf: &[u8]) -> Result<Option<Vec<SparseChunk>>, SparseError> {
    let mut lines = buf.split(|&b| b == b'\n');
    // the final piece has no terminating newline and may be cut short
    let complete = buf.iter().filter(|&&b| b == b'\n').count();

    let mut next = |taken: &mut usize| -> Result<Option<u64>, SparseError> {
        if *taken >= complete {
            return Ok(None);
        }
        *taken += 1;
        match lines.next() {
            Some(line) => parse_number(&String::from_utf8_lossy(line)).map(Some),
            None => Ok(None),
        }
    };

    let mut taken = 0;
    let Some(count) = next(&mut taken)? else {
        return Ok(None);
    };
    let mut chunks = Vec::new();
    for _ in 0..count {
        let Some(offset) = next(&mut taken)? else {
            return Ok(None);
        };
        let Some(length) = next(&mut taken)? else {
            return Ok(None);
        };
        chunks.push(SparseChunk { offset, length });
    }
    Ok(Some(chunks))
}

/// Check that chunks are ordered, disjoint and inside the expanded file.
pub fn validate(chunks: &[SparseChunk], real_size: u64) -> Result<(), SparseError> {
    let mut end = 0u64;
    for chunk in chunks {
        let chunk_end = chunk
            .offset
            .checked_add(chunk.length)
            .ok_or(SparseError::Malformed("chunk overflows"))?;
        if chunk.offset < end {
            return Err(SparseError::Malformed("chunks overlap or are out of order"));
        }
        if chunk_end > real_size {
            return Err(SparseError::Malformed("chunk extends past expanded size"));
        }
        end = chunk_end;
    }
    Ok(())
}

/// Total number of stored bytes described by a map.
#[must_use]
pub fn stored_len(chunks: &[SparseChunk]) -> u64 {
    chunks.iter().map(|c| c.length).sum()
}

fn parse_number(s: &str) -> Result<u64, SparseError> {
    s.trim()
        .parse()
        .map_err(|_| SparseError::InvalidNumber(s.to_owned()))
}
