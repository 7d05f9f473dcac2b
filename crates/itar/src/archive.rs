//! Random access to the members of an indexed archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, trace, warn};
use once_cell::sync::OnceCell;
use tar_header::stream::{decode_at, Limits, TarEntry};

use crate::config::OpenOptions;
use crate::error::{Error, Result};
use crate::index::ShardedIndex;
use crate::member::{IndexEntry, MemberRecord, Payload};
use crate::pread::{PositionalFile, SeekingFile, ShardSource};
use crate::section::{MemberBody, MemberReader, SectionReader, SparseReader};

/// One shard as seen by the reader.
enum ShardHandle {
    /// Opened on first use and closed with the archive.
    Owned {
        path: PathBuf,
        thread_safe: bool,
        source: OnceCell<Arc<dyn ShardSource>>,
    },
    /// Supplied by the caller, who keeps ownership.
    External {
        label: String,
        source: Arc<dyn ShardSource>,
    },
}

impl ShardHandle {
    fn source(&self) -> Result<Arc<dyn ShardSource>> {
        match self {
            ShardHandle::Owned {
                path,
                thread_safe,
                source,
            } => source
                .get_or_try_init(|| {
                    debug!("opening shard {} (thread_safe={thread_safe})", path.display());
                    let file: Arc<dyn ShardSource> = if *thread_safe {
                        Arc::new(PositionalFile::open(path)?)
                    } else {
                        Arc::new(SeekingFile::open(path)?)
                    };
                    Ok::<_, Error>(file)
                })
                .cloned(),
            ShardHandle::External { source, .. } => Ok(Arc::clone(source)),
        }
    }

    fn label(&self) -> String {
        match self {
            ShardHandle::Owned { path, .. } => path.display().to_string(),
            ShardHandle::External { label, .. } => label.clone(),
        }
    }

    fn is_owned(&self) -> bool {
        matches!(self, ShardHandle::Owned { .. })
    }

    fn release(&mut self) {
        if let ShardHandle::Owned { path, source, .. } = self {
            if source.take().is_some() {
                debug!("closed shard {}", path.display());
            }
        }
    }
}

/// A read-only view of every member of an indexed archive.
///
/// Lookups go through the shared [`ShardedIndex`]; shard files are opened
/// the first time one of their members is read. The value is `Sync`, so one
/// archive can serve readers on many threads, although concurrent reads of
/// a shard are only safe when it was opened with
/// [`OpenOptions::thread_safe`].
///
/// After [`close`](Self::close) every operation fails with
/// [`Error::UseAfterClose`]. Readers handed out before that keep their shard
/// open until they are dropped.
pub struct IndexedTar {
    index: Arc<ShardedIndex>,
    shards: Vec<ShardHandle>,
    buffer_capacity: usize,
    max_link_depth: usize,
    limits: Limits,
    closed: bool,
}

impl std::fmt::Debug for IndexedTar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedTar")
            .field("members", &self.index.len())
            .field("shards", &self.shards.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl IndexedTar {
    /// Open the index at `index_path` with default options.
    pub fn open(index_path: &Path) -> Result<Self> {
        Self::open_with(index_path, &OpenOptions::default())
    }

    pub(crate) fn open_with(index_path: &Path, options: &OpenOptions) -> Result<Self> {
        let index = ShardedIndex::load(index_path)?;
        let paths = match &options.shards {
            Some(paths) => paths.clone(),
            None => index.shard_paths(index_path),
        };
        Self::with_paths(index, paths, options)
    }

    /// Read `index` from archives at `paths`, opened on demand.
    pub fn with_paths(
        index: impl Into<Arc<ShardedIndex>>,
        paths: Vec<PathBuf>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let shards = paths
            .into_iter()
            .map(|path| ShardHandle::Owned {
                path,
                thread_safe: options.thread_safe,
                source: OnceCell::new(),
            })
            .collect();
        Self::new(index.into(), shards, options)
    }

    /// Read `index` from caller-supplied shard sources.
    ///
    /// The sources are used as given: member reads are not buffered and
    /// closing the archive leaves them alone.
    pub fn from_sources(
        index: impl Into<Arc<ShardedIndex>>,
        sources: Vec<Arc<dyn ShardSource>>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let shards = sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| ShardHandle::External {
                label: format!("shard {i}"),
                source,
            })
            .collect();
        Self::new(index.into(), shards, options)
    }

    fn new(
        index: Arc<ShardedIndex>,
        shards: Vec<ShardHandle>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let expected = index.shards().shard_count();
        if shards.len() != expected {
            return Err(Error::Layout(format!(
                "index describes {expected} shard(s) but {} were given",
                shards.len()
            )));
        }
        Ok(Self {
            index,
            shards,
            buffer_capacity: options.buffer_capacity,
            max_link_depth: options.max_link_depth,
            limits: options.limits.clone(),
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::UseAfterClose)
        } else {
            Ok(())
        }
    }

    fn shard(&self, entry: &IndexEntry) -> Result<&ShardHandle> {
        let i = entry.shard_id.unwrap_or(0) as usize;
        self.shards.get(i).ok_or_else(|| {
            Error::Layout(format!(
                "member refers to shard {i} of {}",
                self.shards.len()
            ))
        })
    }

    /// The shared index.
    pub fn index(&self) -> Result<&Arc<ShardedIndex>> {
        self.ensure_open()?;
        Ok(&self.index)
    }

    /// Whether `name` is a member.
    pub fn contains(&self, name: &str) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.index.contains(name))
    }

    /// Number of members.
    pub fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.index.len())
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.index.is_empty())
    }

    /// Member names.
    pub fn names(&self) -> Result<impl ExactSizeIterator<Item = &str>> {
        self.ensure_open()?;
        Ok(self.index.names())
    }

    /// The index entry for `name`, without following links.
    pub fn entry(&self, name: &str) -> Result<&IndexEntry> {
        self.ensure_open()?;
        self.index
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    /// Open a member's content, following links.
    ///
    /// A link's target is looked up by name like any other member, which
    /// may be in another shard. More than the configured number of
    /// redirects fails with [`Error::LinkCycle`].
    pub fn open_member(&self, name: &str) -> Result<MemberReader> {
        let mut current = name;
        let mut redirects = 0;
        loop {
            let entry = self.entry(current)?;
            match &entry.record.payload {
                Payload::Size(size) => return self.reader(entry, *size),
                Payload::Target(target) => {
                    if redirects == self.max_link_depth {
                        return Err(Error::LinkCycle {
                            name: name.to_owned(),
                            limit: self.max_link_depth,
                        });
                    }
                    redirects += 1;
                    trace!("{current} -> {target}");
                    current = target.as_str();
                }
            }
        }
    }

    /// Read a whole member into memory, following links.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.open_member(name)?.read_all()?)
    }

    fn reader(&self, entry: &IndexEntry, size: u64) -> Result<MemberReader> {
        let shard = self.shard(entry)?;
        let source = shard.source()?;
        let record = &entry.record;
        let body = match &record.sparse {
            None => MemberBody::Plain(SectionReader::new(source, record.data_offset, size)),
            Some(map) => {
                MemberBody::Sparse(SparseReader::new(source, record.data_offset, map, size))
            }
        };
        let capacity = shard.is_owned().then_some(self.buffer_capacity);
        Ok(MemberReader::new(body, capacity))
    }

    /// Decode the member's header group afresh from its shard.
    ///
    /// Links are not followed.
    pub fn info(&self, name: &str) -> Result<TarEntry> {
        let entry = self.entry(name)?;
        let shard = self.shard(entry)?;
        let source = shard.source()?;
        decode_at(&*source, entry.record.header_offset, &self.limits)
            .map_err(|e| Error::from_stream(shard.label(), e))
    }

    /// Check that the shard still holds what the index recorded for `name`.
    ///
    /// The name, both offsets, the size and whether a sparse map is present
    /// must match the freshly decoded header. The size is not compared for
    /// links. Content bytes are not checked.
    pub fn verify(&self, name: &str) -> Result<()> {
        let expected = &self.entry(name)?.record;
        let live = self.info(name)?;
        let actual = MemberRecord::from_entry(&live);
        let is_link = live.is_symlink() || live.is_hard_link();

        let matches = live.path_lossy() == name
            && actual.header_offset == expected.header_offset
            && actual.data_offset == expected.data_offset
            && (is_link || actual.payload == expected.payload)
            && actual.is_sparse() == expected.is_sparse();
        if matches {
            return Ok(());
        }
        let expected = expected.summary(name);
        let actual = actual.summary(&live.path_lossy());
        warn!("index mismatch: expected {expected}, got {actual}");
        Err(Error::IndexMismatch {
            expected: Box::new(expected),
            actual: Box::new(actual),
        })
    }

    /// Verify every member, collecting all failures.
    pub fn verify_all(&self) -> Result<Vec<Error>> {
        self.ensure_open()?;
        let failures = self
            .index
            .names()
            .filter_map(|name| self.verify(name).err())
            .collect::<Vec<_>>();
        debug!(
            "verified {} members, {} failures",
            self.index.len(),
            failures.len()
        );
        Ok(failures)
    }

    /// Release the shard files this archive opened.
    ///
    /// Caller-supplied sources are left alone. Calling this again does
    /// nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for shard in &mut self.shards {
            shard.release();
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for IndexedTar {
    fn drop(&mut self) {
        self.close();
    }
}
