//! Random access to members of large tar archives.
//!
//! An index maps every member name of one archive, or of a set of numbered
//! shard archives, to the shard holding it and the offsets of its header and
//! content. With the index loaded, reading a member costs one lookup and a
//! bounded read; nothing is scanned and nothing is held in memory.
//!
//! ```no_run
//! use std::io::Read;
//! use std::path::Path;
//!
//! let index = Path::new("/data/images.itar");
//! itar::create(index, &itar::ShardSet::detect(index)?)?;
//!
//! let archive = itar::open(index)?;
//! let mut content = String::new();
//! archive.open_member("labels.txt")?.read_to_string(&mut content)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Links are stored as the name of their target and followed when opened.
//! Symbolic link targets are joined onto the link's directory without
//! resolving `.` or `..`, so a target that leaves the archive root is
//! reported as missing.

pub mod archive;
pub mod config;
pub mod error;
pub mod index;
pub mod layout;
pub mod member;
pub mod pread;
pub mod section;
pub mod shard;

use std::path::Path;
use std::sync::Arc;

pub use archive::IndexedTar;
pub use config::{BuildOptions, OpenOptions};
pub use error::{Error, Result};
pub use index::{BuildProgress, ShardedIndex};
pub use layout::{shard_path, ShardDescriptor, ShardSet};
pub use member::{IndexEntry, MemberRecord, Payload, SparseRange};
pub use pread::{PositionalFile, SeekingFile, ShardSource};
pub use section::MemberReader;
pub use shard::{index_shard, ShardTable};

/// Open the index at `index_path` and its layout-derived shards.
pub fn open(index_path: &Path) -> Result<IndexedTar> {
    IndexedTar::open(index_path)
}

/// Scan `shards` and save the index at `index_path`.
pub fn create(index_path: &Path, shards: &ShardSet) -> Result<ShardedIndex> {
    create_with(index_path, shards, &BuildOptions::default())
}

/// Like [`create`], with explicit build options.
pub fn create_with(
    index_path: &Path,
    shards: &ShardSet,
    options: &BuildOptions,
) -> Result<ShardedIndex> {
    let index = ShardedIndex::build_paths(index_path, shards, options)?;
    index.save(index_path)?;
    Ok(index)
}

/// Build an index in memory from caller-supplied shard sources.
pub fn build(shards: ShardDescriptor, sources: &[Arc<dyn ShardSource>]) -> Result<ShardedIndex> {
    ShardedIndex::build(shards, sources, &BuildOptions::default())
}

/// Save `index` at `index_path`.
pub fn dump(index: &ShardedIndex, index_path: &Path) -> Result<()> {
    index.save(index_path)
}

/// Read the index at `index_path`.
pub fn load(index_path: &Path) -> Result<ShardedIndex> {
    ShardedIndex::load(index_path)
}
