//! The global index over all shards, and its on-disk form.
//!
//! An index file is the four bytes `ITAR`, one format version byte, and the
//! bincode encoding of [`ShardedIndex`]: the shard descriptor followed by
//! the name table. Files are replaced atomically when saved.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::BuildOptions;
use crate::error::{Error, Result};
use crate::layout::{ShardDescriptor, ShardSet};
use crate::member::IndexEntry;
use crate::pread::{PositionalFile, ShardSource};
use crate::shard::{index_source, ShardTable};

/// Leading bytes of every index file.
pub const INDEX_MAGIC: &[u8; 4] = b"ITAR";

/// Format version written after [`INDEX_MAGIC`].
pub const INDEX_VERSION: u8 = 1;

/// Receives a call each time a shard has been scanned.
///
/// With parallel builds the calls come from worker threads, in completion
/// order.
pub trait BuildProgress: Send + Sync {
    /// Shard `shard` (labelled `label`) produced `members` distinct names.
    fn shard_finished(&self, shard: usize, label: &str, members: usize);
}

/// Member name to `(shard id, record)` across every shard.
///
/// Immutable once built; share it behind an [`Arc`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardedIndex {
    shards: ShardDescriptor,
    table: IndexMap<String, IndexEntry>,
}

impl ShardedIndex {
    /// Merge per-shard tables in shard order.
    ///
    /// A name found in several shards belongs to the last of them.
    pub fn from_tables(shards: ShardDescriptor, tables: Vec<ShardTable>) -> Result<Self> {
        check_count(&shards, tables.len())?;
        let mut table = IndexMap::new();
        for (shard_index, shard_table) in (0u32..).zip(tables) {
            let shard_id = shards.shard_id(shard_index);
            table.extend(
                shard_table
                    .into_iter()
                    .map(|(name, record)| (name, IndexEntry { shard_id, record })),
            );
        }
        Ok(Self { shards, table })
    }

    /// Scan caller-provided shard sources and merge them.
    pub fn build(
        shards: ShardDescriptor,
        sources: &[Arc<dyn ShardSource>],
        options: &BuildOptions,
    ) -> Result<Self> {
        let labelled = sources
            .iter()
            .enumerate()
            .map(|(i, source)| (format!("shard {i}"), Arc::clone(source)))
            .collect::<Vec<_>>();
        let tables = scan_all(&labelled, options)?;
        Self::from_tables(shards, tables)
    }

    /// Scan the archives of `set` for an index stored at `index_path`.
    pub fn build_paths(
        index_path: &Path,
        set: &ShardSet,
        options: &BuildOptions,
    ) -> Result<Self> {
        let shards = ShardDescriptor::from_set(index_path, set)?;
        let labelled = set
            .paths()
            .iter()
            .map(|path| {
                let file: Arc<dyn ShardSource> = Arc::new(PositionalFile::open(path)?);
                Ok((path.display().to_string(), file))
            })
            .collect::<Result<Vec<_>>>()?;
        let tables = scan_all(&labelled, options)?;
        Self::from_tables(shards, tables)
    }

    /// How the index refers to its archives.
    #[must_use]
    pub fn shards(&self) -> &ShardDescriptor {
        &self.shards
    }

    /// Archive paths for this index stored at `index_path`.
    #[must_use]
    pub fn shard_paths(&self, index_path: &Path) -> Vec<PathBuf> {
        self.shards.resolve(index_path)
    }

    /// The merged table. Names keep the position of their first
    /// occurrence; equality ignores order.
    #[must_use]
    pub fn table(&self) -> &IndexMap<String, IndexEntry> {
        &self.table
    }

    /// Look up a member.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.table.get(name)
    }

    /// Whether a member exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the index has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Member names.
    pub fn names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Members with their entries.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &IndexEntry)> {
        self.table.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Write the index file format to `writer`.
    pub fn dump<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(INDEX_MAGIC)?;
        writer.write_all(&[INDEX_VERSION])?;
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Read the index file format from `reader`.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut preamble = [0u8; 5];
        if let Err(e) = reader.read_exact(&mut preamble) {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => not_an_index("file too short"),
                _ => e.into(),
            });
        }
        if &preamble[..4] != INDEX_MAGIC {
            return Err(not_an_index("bad magic"));
        }
        if preamble[4] != INDEX_VERSION {
            return Err(not_an_index(&format!(
                "unsupported version {}",
                preamble[4]
            )));
        }
        Ok(bincode::deserialize_from(reader)?)
    }

    /// Atomically write the index to `index_path`.
    pub fn save(&self, index_path: &Path) -> Result<()> {
        let dir = match index_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        self.dump(BufWriter::new(tmp.as_file_mut()))?;
        tmp.as_file().sync_all()?;
        tmp.persist(index_path).map_err(|e| e.error)?;
        info!(
            "wrote index {} ({} members, {} shards)",
            index_path.display(),
            self.len(),
            self.shards.shard_count()
        );
        Ok(())
    }

    /// Read an index file.
    pub fn load(index_path: &Path) -> Result<Self> {
        let file = File::open(index_path)?;
        let index = Self::read_from(BufReader::new(file))?;
        debug!(
            "loaded index {} ({} members)",
            index_path.display(),
            index.len()
        );
        Ok(index)
    }
}

fn check_count(shards: &ShardDescriptor, count: usize) -> Result<()> {
    if shards.shard_count() == count {
        Ok(())
    } else {
        Err(Error::Layout(format!(
            "index describes {} shard(s) but {count} were given",
            shards.shard_count()
        )))
    }
}

fn not_an_index(reason: &str) -> Error {
    Error::Codec(Box::new(bincode::ErrorKind::Custom(format!(
        "not an index file: {reason}"
    ))))
}

/// A shard source with the label used in logs and progress reports.
type LabelledSource = (String, Arc<dyn ShardSource>);

/// Scan every shard, in parallel if asked, keeping shard order.
fn scan_all(shards: &[LabelledSource], options: &BuildOptions) -> Result<Vec<ShardTable>> {
    let scan = |(i, (label, source)): (usize, &LabelledSource)| -> Result<ShardTable> {
        let table = index_source(&**source, label, &options.limits)?;
        if let Some(progress) = &options.progress {
            progress.shard_finished(i, label, table.len());
        }
        Ok(table)
    };
    if options.parallel && shards.len() > 1 {
        shards.par_iter().enumerate().map(scan).collect()
    } else {
        shards.iter().enumerate().map(scan).collect()
    }
}
