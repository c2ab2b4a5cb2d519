//! Derived dataset cache (dscache).
//!
//! The dscache flattens every known oplog into a [`CacheEntry`] so that
//! `(username, name)` lookups do not need to replay logs. It holds no
//! authority: any entry can be thrown away and recomputed from its log, and
//! the whole cache can be rebuilt with [`DsCache::rebuild`].
//!
//! # Concurrency
//!
//! The current [`CacheTable`] sits behind an [`ArcSwap`]. Readers load the
//! table pointer without locking; writers build a complete replacement
//! table and swap it in. A reader therefore sees either the old table or the
//! new one, never a half-applied patch.
//!
//! # On disk
//!
//! ```text
//! {"version":1,"entries":[{"id":"…","owner":"…","username":"b5","name":"movies",
//!   "head":"Qm2","version_count":2,"op_count":3,"stale":false,"foreign":false}]}
//! ```
//!
//! Written atomically (temp file in the same directory, fsync, rename).

mod entry;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use entry::{CacheEntry, CacheTable};

use crate::model::types::{DatasetName, OplogId, Username};
use crate::oplog::{FoldError, Oplog};

/// Current on-disk format version.
pub const CACHE_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors saving or loading the cache file.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem error.
    #[error("dscache file {}: {source}", path.display())]
    Io {
        /// The cache file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The cache file is not valid JSON for this format.
    #[error("dscache file {}: {source}", path.display())]
    Decode {
        /// The cache file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The cache could not be encoded.
    #[error("encoding dscache: {0}")]
    Encode(#[source] serde_json::Error),

    /// The cache file was written by an unknown format version.
    #[error("dscache file {} has format version {found}, expected {CACHE_FORMAT_VERSION}", path.display())]
    Version {
        /// The cache file path.
        path: PathBuf,
        /// Version found in the file.
        found: u32,
    },
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<CacheEntry>,
}

// ---------------------------------------------------------------------------
// DsCache
// ---------------------------------------------------------------------------

/// Lock-free-read cache of flattened dataset state.
#[derive(Debug, Default)]
pub struct DsCache {
    table: ArcSwap<CacheTable>,
    save_lock: Mutex<()>,
}

impl DsCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache seeded with `table`.
    #[must_use]
    pub fn from_table(table: CacheTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
            save_lock: Mutex::new(()),
        }
    }

    /// The current table. The snapshot stays valid (and unchanged) however
    /// many writes happen after it was taken.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CacheTable> {
        self.table.load_full()
    }

    /// Look up a dataset by owner username and name.
    #[must_use]
    pub fn lookup(&self, username: &Username, name: &DatasetName) -> Option<CacheEntry> {
        self.table.load().lookup(username, name).cloned()
    }

    /// Look up a dataset by id.
    #[must_use]
    pub fn get(&self, id: &OplogId) -> Option<CacheEntry> {
        self.table.load().get(id).cloned()
    }

    /// Every entry, ordered by id.
    #[must_use]
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.table.load().iter().cloned().collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    /// `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }

    /// Insert or replace one entry.
    pub fn patch(&self, entry: CacheEntry) {
        debug!(id = %entry.id.short(), name = %entry.name, "patching dscache entry");
        self.table.rcu(|current| {
            let mut next = CacheTable::clone(current);
            next.upsert(entry.clone());
            next
        });
    }

    /// Insert an entry rebuilt by replay, unless a commit has already
    /// patched in a later state of the same log. Returns `true` if the entry
    /// was installed.
    pub fn refresh(&self, entry: CacheEntry) -> bool {
        let mut installed = false;
        self.table.rcu(|current| {
            let mut next = CacheTable::clone(current);
            installed = next.refresh(entry.clone());
            next
        });
        installed
    }

    /// Flag an entry for rebuild on its next lookup. Returns `false` if the
    /// id is not cached.
    pub fn mark_stale(&self, id: &OplogId) -> bool {
        let mut found = false;
        self.table.rcu(|current| {
            let mut next = CacheTable::clone(current);
            found = next.set_stale(id);
            next
        });
        found
    }

    /// Install `table` wholesale.
    pub fn replace(&self, table: CacheTable) {
        self.table.store(Arc::new(table));
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.table.store(Arc::new(CacheTable::default()));
    }

    /// Replace the whole table by full replay of `logs`.
    ///
    /// Each item pairs a log with its foreign flag. Returns the number of
    /// entries built.
    ///
    /// # Errors
    /// Returns the first replay error; the cache is left as it was.
    pub fn rebuild<'a, I>(&self, logs: I) -> Result<usize, FoldError>
    where
        I: IntoIterator<Item = (&'a Oplog, bool)>,
    {
        let mut entries = Vec::new();
        for (log, foreign) in logs {
            let state = log.replay()?;
            if let Some(entry) = CacheEntry::from_state(log, &state, foreign) {
                entries.push(entry);
            }
        }
        let table = CacheTable::from_entries(entries);
        let count = table.len();
        self.table.store(Arc::new(table));
        debug!(entries = count, "rebuilt dscache");
        Ok(count)
    }

    // -- persistence --

    /// Write the current table to `path` atomically.
    ///
    /// Saves are serialized; each writes the table that is current once it
    /// holds the lock, so the file never moves backwards.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let _guard = self
            .save_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let io_err = |source| CacheError::Io {
            path: path.to_owned(),
            source,
        };
        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            entries: self.entries(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(CacheError::Encode)?;

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        debug!(path = %path.display(), entries = file.entries.len(), "saved dscache");
        Ok(())
    }

    /// Load a cache previously written by [`DsCache::save`].
    ///
    /// A missing file yields an empty cache.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        let file: CacheFile = serde_json::from_slice(&bytes).map_err(|source| {
            warn!(path = %path.display(), "unreadable dscache file");
            CacheError::Decode {
                path: path.to_owned(),
                source,
            }
        })?;
        if file.version != CACHE_FORMAT_VERSION {
            return Err(CacheError::Version {
                path: path.to_owned(),
                found: file.version,
            });
        }
        Ok(Self::from_table(CacheTable::from_entries(file.entries)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
