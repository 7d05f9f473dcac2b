//! Scanning one archive into a per-shard table.

use std::io::{BufReader, Read};

use indexmap::IndexMap;
use log::{debug, trace};
use tar_header::stream::{Limits, TarStreamParser};

use crate::error::{Error, Result};
use crate::member::MemberRecord;
use crate::pread::{PositionalReader, ShardSource};

/// Name to record mapping for one shard.
pub type ShardTable = IndexMap<String, MemberRecord>;

const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// Index every member of the tar stream `reader`.
///
/// A name that occurs more than once keeps the record of its last
/// occurrence. `label` names the shard in errors and log messages.
pub fn index_shard<R: Read>(reader: R, label: &str, limits: &Limits) -> Result<ShardTable> {
    debug!("{label}: scanning");
    let mut parser = TarStreamParser::new(reader, limits.clone());
    let mut table = ShardTable::new();
    let mut members = 0usize;
    while let Some(entry) = parser
        .next_entry()
        .map_err(|e| Error::from_stream(label, e))?
    {
        let name = entry.path_lossy().into_owned();
        let record = MemberRecord::from_entry(&entry);
        trace!("{label}: {name} {record:?}");
        members += 1;
        if table.insert(name, record).is_some() {
            trace!("{label}: later entry replaces earlier one");
        }
    }
    debug!(
        "{label}: {members} entries, {} distinct names, {} bytes",
        table.len(),
        parser.position()
    );
    Ok(table)
}

/// Index a shard through positional reads.
pub(crate) fn index_source(
    source: &dyn ShardSource,
    label: &str,
    limits: &Limits,
) -> Result<ShardTable> {
    let reader = BufReader::with_capacity(SCAN_BUFFER_SIZE, PositionalReader::new(source));
    index_shard(reader, label, limits)
}
