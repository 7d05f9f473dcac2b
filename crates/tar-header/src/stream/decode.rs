//! Entry decoding shared by the streaming parser and [`decode_at`].

use log::{debug, trace};

use crate::sparse::{self, SparseFormat, SparsePax};
use crate::{
    truncate_null, EntryType, Header, PaxExtensions, ReadAt, BLOCK_SIZE, HEADER_SIZE,
    PAX_GID, PAX_GNAME, PAX_LINKPATH, PAX_MTIME, PAX_PATH, PAX_SIZE, PAX_UID, PAX_UNAME,
};

use super::entry::TarEntry;
use super::error::{Result, StreamError};
use super::limits::Limits;
use super::source::{BlockSource, Positional};

/// Metadata entries seen since the last actual entry.
#[derive(Debug, Default)]
struct Pending {
    /// Offset of the first long-name/long-link/PAX block of the group.
    start: Option<u64>,
    long_name: Option<Vec<u8>>,
    long_link: Option<Vec<u8>>,
    pax: Option<Vec<u8>>,
    count: usize,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.long_name.is_none() && self.long_link.is_none() && self.pax.is_none()
    }

    fn end_of_archive(&self) -> Result<Option<TarEntry>> {
        if self.is_empty() {
            Ok(None)
        } else {
            Err(StreamError::OrphanedMetadata)
        }
    }

    fn store(slot: &mut Option<Vec<u8>>, data: Vec<u8>, kind: &'static str, pos: u64) -> Result<()> {
        if slot.is_some() {
            return Err(StreamError::DuplicateMetadata { kind, pos });
        }
        *slot = Some(data);
        Ok(())
    }
}

/// Decode the next actual entry from `src`, folding preceding metadata
/// entries into it. Returns `Ok(None)` at a zero block or a clean end of
/// input on a block boundary.
///
/// On return `src` is positioned at the entry's `data_offset`.
pub(crate) fn decode_next<S: BlockSource>(src: &mut S, limits: &Limits) -> Result<Option<TarEntry>> {
    let mut pending = Pending::default();
    let mut block = [0u8; HEADER_SIZE];

    loop {
        if pending.count > limits.max_pending_entries {
            return Err(StreamError::TooManyPendingEntries {
                count: pending.count,
                limit: limits.max_pending_entries,
            });
        }

        let pos = src.position();
        if !src.read_block(&mut block)? {
            return pending.end_of_archive();
        }
        let header = *Header::from_bytes_exact(&block);
        if header.is_empty() {
            return pending.end_of_archive();
        }

        let header_err = |source| StreamError::Header { pos, source };
        header.verify_checksum().map_err(header_err)?;
        let size = header.entry_size().map_err(header_err)?;
        let padded = size
            .checked_next_multiple_of(BLOCK_SIZE)
            .ok_or(StreamError::InvalidSize(size))?;

        match header.entry_type() {
            EntryType::GnuLongName => {
                let name = read_long(src, size, padded, limits)?;
                Pending::store(&mut pending.long_name, name, "GNU long name", pos)?;
            }
            EntryType::GnuLongLink => {
                let link = read_long(src, size, padded, limits)?;
                Pending::store(&mut pending.long_link, link, "GNU long link", pos)?;
            }
            EntryType::XHeader => {
                if size > limits.max_pax_size {
                    return Err(StreamError::PaxTooLarge {
                        size,
                        limit: limits.max_pax_size,
                    });
                }
                let data = read_content(src, size, padded)?;
                Pending::store(&mut pending.pax, data, "PAX extended header", pos)?;
            }
            EntryType::XGlobalHeader => {
                trace!("skipping PAX global header at {pos}");
                src.skip(padded)?;
                pending.count += 1;
                continue;
            }
            _ => return resolve(src, pos, header, pending, limits).map(Some),
        }
        pending.start.get_or_insert(pos);
        pending.count += 1;
    }
}

/// Decode the entry whose first block is at `offset`, using positional
/// reads only. `offset` may point at a long-name/PAX block preceding the
/// entry, as recorded in [`TarEntry::header_offset`].
///
/// # Errors
///
/// Returns [`StreamError::NoEntry`] if `offset` is at the end-of-archive
/// marker or at the end of the source.
pub fn decode_at<S: ReadAt + ?Sized>(source: &S, offset: u64, limits: &Limits) -> Result<TarEntry> {
    let mut src = Positional::new(source, offset);
    decode_next(&mut src, limits)?.ok_or(StreamError::NoEntry { pos: offset })
}

fn read_content<S: BlockSource>(src: &mut S, size: u64, padded: u64) -> Result<Vec<u8>> {
    let len = usize::try_from(size).map_err(|_| StreamError::InvalidSize(size))?;
    let mut data = vec![0u8; len];
    src.read_exact(&mut data)?;
    src.skip(padded - size)?;
    Ok(data)
}

fn read_long<S: BlockSource>(src: &mut S, size: u64, padded: u64, limits: &Limits) -> Result<Vec<u8>> {
    if size > limits.max_gnu_long_size {
        return Err(StreamError::GnuLongTooLarge {
            size,
            limit: limits.max_gnu_long_size,
        });
    }
    let mut data = read_content(src, size, padded)?;
    let len = truncate_null(&data).len();
    data.truncate(len);
    limits.check_path(&data)?;
    Ok(data)
}

fn resolve<S: BlockSource>(
    src: &mut S,
    pos: u64,
    header: Header,
    pending: Pending,
    limits: &Limits,
) -> Result<TarEntry> {
    let header_err = |source| StreamError::Header { pos, source };
    let entry_type = header.entry_type();

    let mut path = pending.long_name.unwrap_or_else(|| header.full_path());
    let mut link_target = pending.long_link.or_else(|| {
        let link = header.link_name_bytes();
        (!link.is_empty()).then(|| link.to_vec())
    });
    let mut size = header.entry_size().map_err(header_err)?;
    let mut uid = header.uid().map_err(header_err)?;
    let mut gid = header.gid().map_err(header_err)?;
    let mut mtime = header.mtime().map_err(header_err)?;
    let mut uname = header.username().map(<[u8]>::to_vec);
    let mut gname = header.groupname().map(<[u8]>::to_vec);
    let mut sparse_pax = SparsePax::default();

    if let Some(pax) = pending.pax.as_deref() {
        for ext in PaxExtensions::new(pax) {
            let ext = ext?;
            let key = ext.key()?;
            let value = ext.value_bytes();
            match key {
                PAX_PATH => path = value.to_vec(),
                PAX_LINKPATH => link_target = Some(value.to_vec()),
                PAX_SIZE => size = ext.value_u64().unwrap_or(size),
                PAX_UID => uid = ext.value_u64().unwrap_or(uid),
                PAX_GID => gid = ext.value_u64().unwrap_or(gid),
                PAX_MTIME => {
                    // fractional seconds are dropped
                    if let Some(secs) = ext.value().ok().and_then(|v| v.split('.').next()) {
                        mtime = secs.parse().unwrap_or(mtime);
                    }
                }
                PAX_UNAME => uname = Some(value.to_vec()),
                PAX_GNAME => gname = Some(value.to_vec()),
                _ => {
                    sparse_pax.record(key, &ext)?;
                }
            }
        }
    }

    if entry_type == EntryType::GnuSparse {
        return Err(StreamError::UnsupportedSparse {
            path: String::from_utf8_lossy(&path).into_owned(),
            pos,
        });
    }

    let mut stored_size = if entry_type.has_data() { size } else { 0 };
    let sparse = match sparse_pax.format() {
        None => None,
        Some(format) => {
            if let Some(name) = sparse_pax.name() {
                path = name.to_vec();
            }
            size = sparse_pax.real_size()?;
            let chunks = match format {
                SparseFormat::V0_0 | SparseFormat::V0_1 => sparse_pax.inline_map()?,
                SparseFormat::V1_0 => {
                    let (chunks, map_len) = read_v1_map(src, stored_size, limits)?;
                    sparse::validate(&chunks, size)?;
                    stored_size = stored_size.checked_sub(map_len).ok_or(
                        sparse::SparseError::Malformed("sparse map runs past member data"),
                    )?;
                    chunks
                }
            };
            debug!(
                "{}: sparse member ({format:?}), {} chunks, {size} bytes expanded",
                String::from_utf8_lossy(&path),
                chunks.len()
            );
            Some(chunks)
        }
    };

    if entry_type.is_dir() {
        while path.last() == Some(&b'/') {
            path.pop();
        }
    }

    limits.check_path(&path)?;
    if let Some(target) = &link_target {
        limits.check_path(target)?;
    }

    Ok(TarEntry {
        header_offset: pending.start.unwrap_or(pos),
        data_offset: src.position(),
        header,
        entry_type,
        path,
        link_target,
        size,
        stored_size,
        sparse,
        mode: header.mode().map_err(header_err)?,
        uid,
        gid,
        mtime,
        uname,
        gname,
    })
}

/// Read the block-padded 1.0 sparse map at the start of the member data.
/// Returns the chunks and the number of bytes the map occupied.
fn read_v1_map<S: BlockSource>(
    src: &mut S,
    stored_size: u64,
    limits: &Limits,
) -> Result<(Vec<sparse::SparseChunk>, u64)> {
    let mut buf = Vec::new();
    loop {
        if let Some(chunks) = sparse::parse_v1_map(&buf)? {
            return Ok((chunks, buf.len() as u64));
        }
        let len = buf.len() as u64;
        if len >= stored_size {
            return Err(sparse::SparseError::Malformed("sparse map runs past member data").into());
        }
        if len >= limits.max_pax_size {
            return Err(StreamError::PaxTooLarge {
                size: len,
                limit: limits.max_pax_size,
            });
        }
        let mut block = [0u8; HEADER_SIZE];
        src.read_exact(&mut block)?;
        buf.extend_from_slice(&block);
    }
}
