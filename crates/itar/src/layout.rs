//! Naming rules that tie an index file to its shard archives.
//!
//! For an index at `dir/data.itar`:
//!
//! | shards | archive paths                                  |
//! |--------|------------------------------------------------|
//! | 1      | `dir/data.tar`                                 |
//! | 3      | `dir/data-0.tar`, `dir/data-1.tar`, `dir/data-2.tar` |
//! | 12     | `dir/data-00.tar` ... `dir/data-11.tar`        |
//!
//! The numeric suffix is zero-padded to the number of digits in `N - 1`.

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Extension used for shard archives.
pub const ARCHIVE_EXTENSION: &str = "tar";

/// The archive path of an unsharded index.
#[must_use]
pub fn single_path(index_path: &Path) -> PathBuf {
    index_path.with_extension(ARCHIVE_EXTENSION)
}

/// The numbered archive path of shard `shard_index` out of `shard_count`.
#[must_use]
pub fn numbered_shard_path(index_path: &Path, shard_count: usize, shard_index: usize) -> PathBuf {
    let width = suffix_width(shard_count);
    let mut name = OsString::from(index_path.file_stem().unwrap_or_default());
    name.push(format!("-{shard_index:0width$}.{ARCHIVE_EXTENSION}"));
    index_path.with_file_name(name)
}

/// The archive path of shard `shard_index` out of `shard_count`.
///
/// A single shard uses the unsuffixed name.
#[must_use]
pub fn shard_path(index_path: &Path, shard_count: usize, shard_index: usize) -> PathBuf {
    if shard_count == 1 {
        single_path(index_path)
    } else {
        numbered_shard_path(index_path, shard_count, shard_index)
    }
}

fn suffix_width(shard_count: usize) -> usize {
    shard_count.saturating_sub(1).to_string().len()
}

fn index_dir(index_path: &Path) -> &Path {
    match index_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Compare paths ignoring `.` components.
fn same_path(a: &Path, b: &Path) -> bool {
    let parts = |p: &'_ Path| {
        p.components()
            .filter(|c| *c != Component::CurDir)
            .map(|c| c.as_os_str().to_os_string())
            .collect::<Vec<_>>()
    };
    parts(a) == parts(b)
}

/// The archives an index is built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShardSet {
    /// One archive, stored under the unsuffixed name.
    Single(PathBuf),
    /// Numbered shards, in shard order.
    Sharded(Vec<PathBuf>),
}

impl ShardSet {
    /// Find the archives belonging to `index_path` on disk.
    ///
    /// Either the unsuffixed archive exists, or a contiguous run of at
    /// least two correctly numbered shards starting at zero does. Anything
    /// else, including both at once, is a layout error.
    pub fn detect(index_path: &Path) -> Result<Self> {
        let single = single_path(index_path);
        let has_single = single.is_file();
        let numbered = detect_numbered(index_path)?;

        let set = match (has_single, numbered) {
            (true, Some(count)) => {
                return Err(Error::Layout(format!(
                    "ambiguous layout for {}: both {} and {count} numbered shards exist",
                    index_path.display(),
                    single.display(),
                )))
            }
            (true, None) => ShardSet::Single(single),
            (false, Some(count)) => ShardSet::Sharded(
                (0..count)
                    .map(|i| numbered_shard_path(index_path, count, i))
                    .collect(),
            ),
            (false, None) => {
                return Err(Error::Layout(format!(
                    "no archive for {}: expected {} or numbered shards",
                    index_path.display(),
                    single.display(),
                )))
            }
        };
        debug!("detected layout for {}: {set:?}", index_path.display());
        Ok(set)
    }

    /// Check explicitly given archive paths against the naming rule.
    ///
    /// One path equal to the unsuffixed name gives [`ShardSet::Single`];
    /// otherwise path `i` must be the numbered name of shard `i`.
    pub fn from_paths(index_path: &Path, mut paths: Vec<PathBuf>) -> Result<Self> {
        let count = paths.len();
        if count == 0 {
            return Err(Error::Layout("no shards given".to_string()));
        }
        if count == 1 && same_path(&paths[0], &single_path(index_path)) {
            return Ok(ShardSet::Single(paths.swap_remove(0)));
        }
        for (i, path) in paths.iter().enumerate() {
            let expected = numbered_shard_path(index_path, count, i);
            if !same_path(path, &expected) {
                return Err(Error::Layout(format!(
                    "shard {i} is named {}, expected {}",
                    path.display(),
                    expected.display(),
                )));
            }
        }
        Ok(ShardSet::Sharded(paths))
    }

    /// Archive paths in shard order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            ShardSet::Single(path) => std::slice::from_ref(path),
            ShardSet::Sharded(paths) => paths,
        }
    }

    /// Number of archives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths().len()
    }

    /// Whether there are no archives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths().is_empty()
    }
}

/// Look for `{stem}-<digits>.tar` next to the index and return the largest
/// valid shard count.
fn detect_numbered(index_path: &Path) -> Result<Option<usize>> {
    let Some(stem) = index_path.file_stem().and_then(|s| s.to_str()) else {
        return Ok(None);
    };
    let prefix = format!("{stem}-");
    let suffix = format!(".{ARCHIVE_EXTENSION}");

    // width -> suffix values seen with that width
    let mut found: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for dirent in std::fs::read_dir(index_dir(index_path))? {
        let dirent = dirent?;
        let name = dirent.file_name();
        let Some(digits) = name
            .to_str()
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|n| n.strip_suffix(&suffix))
        else {
            continue;
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(value) = digits.parse() {
            found.entry(digits.len()).or_default().insert(value);
        }
    }

    let best = found
        .iter()
        .filter_map(|(&width, values)| {
            let count = (0..).take_while(|i| values.contains(i)).count();
            if count < values.len() {
                debug!("ignoring {} shard(s) past a gap at {count}", values.len() - count);
            }
            (count >= 2 && suffix_width(count) == width).then_some(count)
        })
        .max();
    Ok(best)
}

/// How a persisted index refers to its archives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardDescriptor {
    /// One archive at the unsuffixed layout path.
    Single,
    /// Shard paths, relative to the index file's directory where possible.
    Sharded(Vec<PathBuf>),
}

impl ShardDescriptor {
    /// Describe `set` for an index stored at `index_path`.
    pub fn from_set(index_path: &Path, set: &ShardSet) -> Result<Self> {
        let single = single_path(index_path);
        match set {
            ShardSet::Single(path) if same_path(path, &single) => Ok(ShardDescriptor::Single),
            ShardSet::Single(path) => Err(Error::Layout(format!(
                "single archive must be {}, not {}",
                single.display(),
                path.display(),
            ))),
            ShardSet::Sharded(paths) if paths.len() == 1 && same_path(&paths[0], &single) => {
                Ok(ShardDescriptor::Single)
            }
            ShardSet::Sharded(paths) => {
                if u32::try_from(paths.len()).is_err() {
                    return Err(Error::Layout(format!("too many shards: {}", paths.len())));
                }
                let dir = index_path.parent().unwrap_or(Path::new(""));
                let relative = paths
                    .iter()
                    .map(|path| relative_to(dir, path))
                    .collect::<Result<_>>()?;
                Ok(ShardDescriptor::Sharded(relative))
            }
        }
    }

    /// Archive paths for an index stored at `index_path`.
    #[must_use]
    pub fn resolve(&self, index_path: &Path) -> Vec<PathBuf> {
        match self {
            ShardDescriptor::Single => vec![single_path(index_path)],
            ShardDescriptor::Sharded(paths) => {
                let dir = index_path.parent().unwrap_or(Path::new(""));
                paths.iter().map(|path| dir.join(path)).collect()
            }
        }
    }

    /// Number of archives.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        match self {
            ShardDescriptor::Single => 1,
            ShardDescriptor::Sharded(paths) => paths.len(),
        }
    }

    /// Whether this is an unsharded archive.
    #[must_use]
    pub fn is_single(&self) -> bool {
        matches!(self, ShardDescriptor::Single)
    }

    /// The id recorded for members of shard `shard_index`.
    #[must_use]
    pub fn shard_id(&self, shard_index: u32) -> Option<u32> {
        match self {
            ShardDescriptor::Single => None,
            ShardDescriptor::Sharded(_) => Some(shard_index),
        }
    }
}

fn relative_to(dir: &Path, path: &Path) -> Result<PathBuf> {
    if dir.as_os_str().is_empty() && path.is_relative() {
        return Ok(path.to_path_buf());
    }
    match path.strip_prefix(dir) {
        Ok(relative) => Ok(relative.to_path_buf()),
        Err(_) => Ok(std::path::absolute(path)?),
    }
}
