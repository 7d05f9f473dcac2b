//! Options for opening and building indexes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tar_header::stream::Limits;

use crate::archive::IndexedTar;
use crate::error::Result;
use crate::index::BuildProgress;

/// Default read-ahead buffer for member readers over shards opened by the
/// archive.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Default number of link redirects followed before giving up.
pub const DEFAULT_MAX_LINK_DEPTH: usize = 40;

/// How to open an index and its shards.
///
/// ```no_run
/// use itar::OpenOptions;
///
/// let archive = OpenOptions::new()
///     .thread_safe(true)
///     .open("/data/images.itar".as_ref())?;
/// # Ok::<(), itar::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenOptions {
    pub(crate) shards: Option<Vec<PathBuf>>,
    pub(crate) thread_safe: bool,
    pub(crate) buffer_capacity: usize,
    pub(crate) max_link_depth: usize,
    pub(crate) limits: Limits,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            shards: None,
            thread_safe: false,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_link_depth: DEFAULT_MAX_LINK_DEPTH,
            limits: Limits::default(),
        }
    }
}

impl OpenOptions {
    /// Default options: layout-derived shard paths, seek-based reads.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from these archives instead of the ones the index names.
    #[must_use]
    pub fn shards(mut self, shards: Vec<PathBuf>) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Open shards for `pread(2)` so member readers can run on many threads.
    #[must_use]
    pub fn thread_safe(mut self, thread_safe: bool) -> Self {
        self.thread_safe = thread_safe;
        self
    }

    /// Read-ahead buffer size for member readers; zero disables buffering.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Maximum number of link redirects when opening a member.
    #[must_use]
    pub fn max_link_depth(mut self, depth: usize) -> Self {
        self.max_link_depth = depth;
        self
    }

    /// Header decoding limits used by `info` and `verify`.
    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Load the index at `index_path` and prepare its shards.
    pub fn open(&self, index_path: &Path) -> Result<IndexedTar> {
        IndexedTar::open_with(index_path, self)
    }
}

/// How to build an index.
#[derive(Clone)]
pub struct BuildOptions {
    pub(crate) limits: Limits,
    pub(crate) parallel: bool,
    pub(crate) progress: Option<Arc<dyn BuildProgress>>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            parallel: true,
            progress: None,
        }
    }
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("limits", &self.limits)
            .field("parallel", &self.parallel)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl BuildOptions {
    /// Default options: default limits, shards scanned in parallel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Header decoding limits.
    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Scan shards on the rayon pool.
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Report each finished shard to `progress`.
    #[must_use]
    pub fn progress(mut self, progress: Arc<dyn BuildProgress>) -> Self {
        self.progress = Some(progress);
        self
    }
}
