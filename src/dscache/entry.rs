//! Flattened cache rows and the immutable table that holds them.

use std::collections::{BTreeMap, HashMap};

use logbook_cas::Address;
use serde::{Deserialize, Serialize};

use crate::dsref::DsRef;
use crate::identity::AuthorId;
use crate::model::types::{DatasetName, OplogId, Username};
use crate::oplog::{DatasetState, Oplog};

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

/// One dataset, flattened for lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Stable oplog id.
    pub id: OplogId,
    /// Owner key.
    pub owner: AuthorId,
    /// Owner username.
    pub username: Username,
    /// Current dataset name.
    pub name: DatasetName,
    /// Head version, if any.
    pub head: Option<Address>,
    /// Depth of the version stack.
    pub version_count: usize,
    /// Operations in the log.
    pub op_count: usize,
    /// Set when the entry may lag behind its log and must be rebuilt.
    #[serde(default)]
    pub stale: bool,
    /// Set for logs imported from another identity (read-only).
    #[serde(default)]
    pub foreign: bool,
}

impl CacheEntry {
    /// Build an entry for `log` from an already materialized `state`.
    ///
    /// Returns `None` if `state` has not folded an Init operation.
    #[must_use]
    pub fn from_state(log: &Oplog, state: &DatasetState, foreign: bool) -> Option<Self> {
        Some(Self {
            id: log.id().clone(),
            owner: *log.owner(),
            username: log.username().clone(),
            name: state.name.clone()?,
            head: state.head().cloned(),
            version_count: state.version_count(),
            op_count: state.op_count,
            stale: false,
            foreign,
        })
    }

    /// Build an entry from the log's own incrementally maintained state.
    #[must_use]
    pub fn from_oplog(log: &Oplog, foreign: bool) -> Self {
        let state = log.state();
        Self {
            id: log.id().clone(),
            owner: *log.owner(),
            username: log.username().clone(),
            name: log.name().clone(),
            head: state.head().cloned(),
            version_count: state.version_count(),
            op_count: state.op_count,
            stale: false,
            foreign,
        }
    }

    /// The dataset reference this entry resolves to.
    #[must_use]
    pub fn dsref(&self) -> DsRef {
        DsRef::new(self.username.clone(), self.name.clone()).with_path(self.head.clone())
    }

    fn key(&self) -> (Username, DatasetName) {
        (self.username.clone(), self.name.clone())
    }
}

// ---------------------------------------------------------------------------
// CacheTable
// ---------------------------------------------------------------------------

/// An immutable snapshot of the cache: entries keyed by id plus a
/// `(username, name)` index. Tables are never edited once published; every
/// change builds a new one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheTable {
    entries: BTreeMap<OplogId, CacheEntry>,
    by_name: HashMap<(Username, DatasetName), OplogId>,
}

impl CacheTable {
    /// Build a table from a set of entries. Later entries win on id or name
    /// collisions.
    pub fn from_entries(entries: impl IntoIterator<Item = CacheEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.upsert(entry);
        }
        table
    }

    /// Insert or replace the entry with `entry.id`, keeping the name index
    /// in step.
    pub(crate) fn upsert(&mut self, entry: CacheEntry) {
        if let Some(old) = self.entries.get(&entry.id) {
            let old_key = old.key();
            if self.by_name.get(&old_key) == Some(&entry.id) {
                self.by_name.remove(&old_key);
            }
        }
        if let Some(displaced) = self.by_name.insert(entry.key(), entry.id.clone())
            && displaced != entry.id
        {
            self.entries.remove(&displaced);
        }
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Upsert `entry` unless the table already holds a fresh entry for the
    /// same log with more operations folded in.
    pub(crate) fn refresh(&mut self, entry: CacheEntry) -> bool {
        let newer = self
            .entries
            .get(&entry.id)
            .is_some_and(|cur| !cur.stale && cur.op_count > entry.op_count);
        if !newer {
            self.upsert(entry);
        }
        !newer
    }

    pub(crate) fn set_stale(&mut self, id: &OplogId) -> bool {
        self.entries.get_mut(id).is_some_and(|e| {
            e.stale = true;
            true
        })
    }

    /// Look up by id.
    #[must_use]
    pub fn get(&self, id: &OplogId) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// Look up by owner username and dataset name.
    #[must_use]
    pub fn lookup(&self, username: &Username, name: &DatasetName) -> Option<&CacheEntry> {
        let id = self.by_name.get(&(username.clone(), name.clone()))?;
        self.entries.get(id)
    }

    /// Every entry, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
