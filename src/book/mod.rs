//! The book: registry of one identity's dataset logs.
//!
//! A [`Book`] owns every oplog authored by its local identity plus any
//! foreign logs imported for reading. It is the only writer of those logs
//! and the only place authorization happens.
//!
//! # Commit protocol
//!
//! Every mutation follows the same steps:
//!
//! 1. check the context and authorize the caller by key;
//! 2. sign a new operation and fold it onto a *copy* of the log;
//! 3. write the candidate log blob to the store;
//! 4. under the index lock, write a new root index blob and move the root
//!    pointer with compare-and-swap (the commit point);
//! 5. still under the index lock, install the candidate in memory and
//!    patch the dscache;
//! 6. save the dscache file and publish a [`LifecycleEvent`].
//!
//! If anything fails before step 4 completes, nothing in memory, in the
//! cache, or behind the root pointer has changed. Blobs written by an
//! aborted attempt are unreferenced.
//!
//! # Locking
//!
//! Each log has its own writer mutex, so mutations on different datasets run
//! concurrently. The index mutex is held only around the root swap, the
//! in-memory install, and the dscache patch, so cache patches land in commit
//! order. Lock order is always log, then index, then the log table. Readers
//! never take a writer mutex: current logs sit behind [`ArcSwap`] and the
//! dscache is copy-on-write.

pub mod auth;
pub mod index;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use arc_swap::ArcSwap;
use logbook_cas::{Address, ContentStore, RootName, StoreError};
use tracing::{debug, info, instrument, warn};

use crate::clock::LogicalClock;
use crate::context::Context;
use crate::dscache::{CacheEntry, CacheTable, DsCache};
use crate::dsref::{DsRef, VersionInfo, VersionSave};
use crate::error::{LogbookError, Result};
use crate::events::{EventBus, EventKind, LifecycleEvent};
use crate::identity::{Author, AuthorId, KeyProvider};
use crate::model::types::{DatasetName, OplogId, Username};
use crate::oplog::persist;
use crate::oplog::{FoldError, OpPayload, Oplog, OplogError, sign_operation};

use self::index::BookIndex;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Settings for [`Book::open_with`].
#[derive(Clone, Debug, Default)]
pub struct BookOptions {
    /// Load the dscache from, and save it to, this file.
    pub cache_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct LogSlot {
    write: Mutex<()>,
    current: ArcSwap<Oplog>,
    foreign: bool,
}

impl LogSlot {
    fn new(log: Oplog, foreign: bool) -> Arc<Self> {
        Arc::new(Self {
            write: Mutex::new(()),
            current: ArcSwap::from_pointee(log),
            foreign,
        })
    }
}

struct IndexState {
    index: BookIndex,
    address: Option<Address>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn alias(username: &Username, name: &DatasetName) -> String {
    format!("{username}/{name}")
}

fn corrupt(message: impl Into<String>) -> LogbookError {
    LogbookError::CorruptLog {
        message: message.into(),
    }
}

/// Translate a rejected append into the caller-facing error.
fn append_error(dataset: &str, err: OplogError) -> LogbookError {
    match err {
        OplogError::Fold(FoldError::Conflict { declared, head }) => LogbookError::Conflict {
            dataset: dataset.to_owned(),
            declared,
            head,
        },
        OplogError::Fold(FoldError::InsufficientHistory {
            requested,
            available,
        }) => LogbookError::InsufficientHistory {
            dataset: dataset.to_owned(),
            requested,
            available,
        },
        OplogError::Fold(FoldError::ZeroDelete) => LogbookError::InvalidArgument {
            message: "delete count must be at least 1".to_owned(),
        },
        OplogError::NotOwner { .. } => LogbookError::Unauthorized {
            message: err.to_string(),
        },
        OplogError::InvalidSignature { .. } => LogbookError::InvalidSignature {
            message: err.to_string(),
        },
        OplogError::Encoding(e) => LogbookError::Encoding(e),
        OplogError::Fold(_) | OplogError::Empty | OplogError::IdMismatch { .. } => {
            corrupt(format!("{dataset}: {err}"))
        }
    }
}

/// Translate a rejected foreign log into the caller-facing error.
fn import_error(err: OplogError) -> LogbookError {
    match err {
        OplogError::InvalidSignature { .. }
        | OplogError::NotOwner { .. }
        | OplogError::IdMismatch { .. } => LogbookError::InvalidSignature {
            message: err.to_string(),
        },
        OplogError::Encoding(e) => LogbookError::Encoding(e),
        OplogError::Fold(_) | OplogError::Empty => corrupt(err.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// The registry and only writer of one identity's dataset logs.
pub struct Book {
    store: Arc<dyn ContentStore>,
    keys: Arc<dyn KeyProvider>,
    root: RootName,
    clock: LogicalClock,
    logs: RwLock<HashMap<OplogId, Arc<LogSlot>>>,
    index: Mutex<IndexState>,
    cache: DsCache,
    events: EventBus,
    cache_path: Option<PathBuf>,
}

impl std::fmt::Debug for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Book")
            .field("root", &self.root)
            .field("author", self.keys.local())
            .field("datasets", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Book {
    /// Open (or start) the book of `keys.local()` in `store`.
    ///
    /// # Errors
    /// See [`Book::open_with`].
    pub fn open(
        ctx: &Context,
        store: Arc<dyn ContentStore>,
        keys: Arc<dyn KeyProvider>,
    ) -> Result<Self> {
        Self::open_with(ctx, store, keys, BookOptions::default())
    }

    /// Open the book, loading every log named by its root index.
    ///
    /// Every log is verified on load. The dscache is loaded from
    /// `options.cache_path` when it exists (entries that disagree with their
    /// logs are marked stale) and otherwise rebuilt by full replay.
    ///
    /// # Errors
    /// Returns [`LogbookError::Unauthorized`] if the root index belongs to a
    /// different key, [`LogbookError::CorruptLog`] if any stored log or the
    /// index is invalid, and store or context errors as they occur.
    #[instrument(skip_all, fields(username = %keys.local().username()))]
    pub fn open_with(
        ctx: &Context,
        store: Arc<dyn ContentStore>,
        keys: Arc<dyn KeyProvider>,
        options: BookOptions,
    ) -> Result<Self> {
        let local = keys.local().clone();
        let root = index::root_name(local.username()).map_err(StoreError::from)?;

        ctx.check()?;
        let (book_index, address) = match store.read_root(&root)? {
            Some(address) => {
                ctx.check()?;
                let bytes = store.get(&address)?;
                let book_index = BookIndex::from_json(&bytes)
                    .map_err(|e| corrupt(format!("root index {address}: {e}")))?;
                (book_index, Some(address))
            }
            None => (BookIndex::new(&local), None),
        };
        if book_index.owner != local.id() {
            return Err(LogbookError::Unauthorized {
                message: format!(
                    "book {root} belongs to {} ({}), not {}",
                    book_index.username,
                    book_index.owner.short(),
                    local.id().short()
                ),
            });
        }

        let mut logs = HashMap::new();
        let mut last_timestamp = 0;
        for (name, entry) in &book_index.datasets {
            let log = persist::read_oplog(ctx, store.as_ref(), &entry.log)?;
            if log.id() != &entry.id || log.owner() != &local.id() || log.name() != name {
                return Err(corrupt(format!(
                    "log {} does not match index entry {name} ({})",
                    entry.log,
                    entry.id.short()
                )));
            }
            last_timestamp = last_timestamp.max(log.last_timestamp());
            logs.insert(entry.id.clone(), LogSlot::new(log, false));
        }
        for (id, log_address) in &book_index.foreign {
            let log = persist::read_oplog(ctx, store.as_ref(), log_address)?;
            if log.id() != id {
                return Err(corrupt(format!(
                    "foreign log {log_address} does not match id {}",
                    id.short()
                )));
            }
            if let Some(key) = keys.public_key(log.username())
                && &key != log.owner()
            {
                warn!(id = %id.short(), username = %log.username(), "foreign log owner no longer matches registered key");
            }
            logs.insert(id.clone(), LogSlot::new(log, true));
        }

        let book = Self {
            store,
            keys,
            root,
            clock: LogicalClock::resume(last_timestamp),
            logs: RwLock::new(logs),
            index: Mutex::new(IndexState {
                index: book_index,
                address,
            }),
            cache: DsCache::new(),
            events: EventBus::new(),
            cache_path: options.cache_path,
        };
        book.load_cache()?;
        info!(
            datasets = book.cache.len(),
            root = %book.root,
            "opened book"
        );
        Ok(book)
    }

    fn load_cache(&self) -> Result<()> {
        let loaded = match &self.cache_path {
            Some(path) => match DsCache::load(path) {
                Ok(cache) if !cache.is_empty() => Some(cache),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "discarding unreadable dscache");
                    None
                }
            },
            None => None,
        };
        let Some(loaded) = loaded else {
            self.rebuild_cache()?;
            return Ok(());
        };

        // Entries missing from the file are rebuilt on first lookup.
        let slots = self.slots();
        let entries = loaded.entries().into_iter().filter_map(|mut entry| {
            let slot = slots.get(&entry.id)?;
            if CacheEntry::from_oplog(&slot.current.load(), slot.foreign) != entry {
                entry.stale = true;
            }
            Some(entry)
        });
        let table = CacheTable::from_entries(entries);
        debug!(
            entries = table.len(),
            stale = table.iter().filter(|e| e.stale).count(),
            "loaded dscache"
        );
        self.cache.replace(table);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The identity this book signs as.
    #[must_use]
    pub fn author(&self) -> &Author {
        self.keys.local()
    }

    /// The local identity's username.
    #[must_use]
    pub fn username(&self) -> &Username {
        self.keys.local().username()
    }

    /// The local identity's key.
    #[must_use]
    pub fn owner(&self) -> AuthorId {
        self.keys.local().id()
    }

    /// The root pointer this book commits to.
    #[must_use]
    pub const fn root(&self) -> &RootName {
        &self.root
    }

    /// The address of the current root index blob, if anything has been
    /// committed.
    #[must_use]
    pub fn root_address(&self) -> Option<Address> {
        lock(&self.index).address.clone()
    }

    /// The derived dataset cache.
    #[must_use]
    pub const fn cache(&self) -> &DsCache {
        &self.cache
    }

    /// Lifecycle event subscriptions.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// The underlying content store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Create a new dataset named `name` owned by the caller.
    ///
    /// # Errors
    /// - [`LogbookError::Unauthorized`] if `caller` is not the local identity.
    /// - [`LogbookError::AlreadyExists`] if the name is in use.
    /// - Store, context, and encoding errors.
    #[instrument(skip_all, fields(caller = %caller.username(), name = %name))]
    pub fn init_dataset(
        &self,
        ctx: &Context,
        caller: &Author,
        name: DatasetName,
    ) -> Result<DsRef> {
        ctx.check()?;
        auth::require_local(caller, self.keys.local())?;
        let already_exists = || LogbookError::AlreadyExists {
            reference: alias(caller.username(), &name),
        };
        if lock(&self.index).index.id_for(&name).is_some() {
            return Err(already_exists());
        }

        let log = Oplog::init(caller, name.clone(), self.clock.next_timestamp())
            .map_err(|e| append_error(&alias(caller.username(), &name), e))?;
        let address = persist::write_oplog(ctx, self.store.as_ref(), &log)?;
        let id = log.id().clone();

        let guard = self.commit(ctx, |index| {
            if index.id_for(&name).is_some() {
                return Err(already_exists());
            }
            index.set_local(name.clone(), id.clone(), address.clone());
            Ok(())
        })?;
        self.write_logs()
            .insert(id.clone(), LogSlot::new(log.clone(), false));
        self.cache.patch(CacheEntry::from_oplog(&log, false));
        drop(guard);

        Ok(self.after_commit(&log, EventKind::Init, None))
    }

    /// Rename the dataset `dsref` points at to `new_name`.
    ///
    /// Id and history are unchanged; the old name stops resolving in the same
    /// commit that makes the new one resolve.
    ///
    /// # Errors
    /// - [`LogbookError::NotFound`] if `dsref` does not resolve.
    /// - [`LogbookError::NameTaken`] if `new_name` is in use, including by
    ///   this dataset.
    /// - [`LogbookError::Unauthorized`] if the caller does not own it.
    #[instrument(skip_all, fields(caller = %caller.username(), dataset = %dsref, new_name = %new_name))]
    pub fn rename_dataset(
        &self,
        ctx: &Context,
        caller: &Author,
        dsref: &DsRef,
        new_name: DatasetName,
    ) -> Result<DsRef> {
        ctx.check()?;
        auth::require_local(caller, self.keys.local())?;
        let name_taken = || LogbookError::NameTaken {
            username: caller.username().to_string(),
            name: new_name.to_string(),
        };
        let (_, slot) = self.lookup_slot(&dsref.username, &dsref.name)?;
        auth::require_owner(caller, &slot.current.load())?;
        if lock(&self.index).index.id_for(&new_name).is_some() {
            return Err(name_taken());
        }

        let previous = dsref.name.to_string();
        let log = self.append(
            ctx,
            caller,
            &slot,
            &dsref.name,
            OpPayload::Rename {
                name: new_name.clone(),
            },
            |index, _| {
                if index.id_for(&new_name).is_some() {
                    return Err(name_taken());
                }
                Ok(())
            },
        )?;
        Ok(self.after_commit(&log, EventKind::Rename, Some(previous)))
    }

    /// Append a new version to an existing dataset.
    ///
    /// # Errors
    /// - [`LogbookError::NotFound`] if the dataset does not exist.
    /// - [`LogbookError::Conflict`] if `version.previous_path` is not the
    ///   current head.
    /// - [`LogbookError::Unauthorized`] if the caller does not own it.
    #[instrument(
        skip_all,
        fields(caller = %caller.username(), dataset = %version.dataset(), path = %version.path)
    )]
    pub fn save_version(
        &self,
        ctx: &Context,
        caller: &Author,
        version: &VersionSave,
    ) -> Result<DsRef> {
        ctx.check()?;
        auth::require_local(caller, self.keys.local())?;
        let (_, slot) = self.lookup_slot(&version.username, &version.name)?;
        let log = self.append(
            ctx,
            caller,
            &slot,
            &version.name,
            OpPayload::VersionSave {
                previous_path: version.previous_path.clone(),
                path: version.path.clone(),
                title: version.title.clone(),
            },
            |_, _| Ok(()),
        )?;
        Ok(self.after_commit(&log, EventKind::VersionSave, None))
    }

    /// Drop the `count` most recent versions of a dataset.
    ///
    /// # Errors
    /// - [`LogbookError::InvalidArgument`] if `count` is zero.
    /// - [`LogbookError::NotFound`] if the dataset does not exist.
    /// - [`LogbookError::InsufficientHistory`] if fewer than `count` versions
    ///   exist.
    /// - [`LogbookError::Unauthorized`] if the caller does not own it.
    #[instrument(skip_all, fields(caller = %caller.username(), dataset = %dsref, count))]
    pub fn delete_versions(
        &self,
        ctx: &Context,
        caller: &Author,
        dsref: &DsRef,
        count: u32,
    ) -> Result<DsRef> {
        if count == 0 {
            return Err(LogbookError::InvalidArgument {
                message: "delete count must be at least 1".to_owned(),
            });
        }
        ctx.check()?;
        auth::require_local(caller, self.keys.local())?;
        let (_, slot) = self.lookup_slot(&dsref.username, &dsref.name)?;
        let log = self.append(
            ctx,
            caller,
            &slot,
            &dsref.name,
            OpPayload::VersionDelete { count },
            |_, _| Ok(()),
        )?;
        Ok(self.after_commit(&log, EventKind::VersionDelete, None))
    }

    /// Verify a serialized log authored by someone else and register it for
    /// reading.
    ///
    /// The log must decode, every signature must verify against its owner,
    /// every operation must be authored by that owner, the owner key must be
    /// the one the key provider has registered for the log's username, and
    /// the operations must replay. Any failure rejects the whole log.
    /// Re-importing a longer copy of a known log replaces it; a copy that
    /// does not extend the known one is rejected. Each `username/name` is
    /// held by at most one imported log.
    ///
    /// # Errors
    /// [`LogbookError::InvalidSignature`] or [`LogbookError::Unauthorized`]
    /// for verification failures, [`LogbookError::CorruptLog`] if the log
    /// does not replay, [`LogbookError::NameTaken`] if another imported log
    /// already goes by the same name.
    #[instrument(skip_all, fields(len = bytes.len()))]
    pub fn import_foreign(&self, ctx: &Context, bytes: &[u8]) -> Result<DsRef> {
        ctx.check()?;
        let log = Oplog::from_json(bytes).map_err(|e| {
            warn!(error = %e, "rejected foreign log");
            import_error(e)
        })?;
        if log.owner() == &self.owner() {
            return Err(LogbookError::Unauthorized {
                message: "cannot import a log owned by the local identity".to_owned(),
            });
        }
        auth::require_registered_owner(&log, self.keys.public_key(log.username()))
            .inspect_err(|e| warn!(error = %e, "rejected foreign log"))?;

        let id = log.id().clone();
        let existing = self.read_logs().get(&id).cloned();
        let _writer = existing.as_ref().map(|slot| lock(&slot.write));
        if let Some(slot) = &existing {
            let current = slot.current.load();
            if !slot.foreign || !log.ops().starts_with(current.ops()) {
                return Err(LogbookError::InvalidArgument {
                    message: format!("foreign log {} diverges from the imported copy", id.short()),
                });
            }
        }

        let address = persist::write_oplog(ctx, self.store.as_ref(), &log)?;
        let guard = self.commit(ctx, |index| {
            // Checked under the index lock so two imports cannot both claim
            // the same name.
            if self.foreign_name_holder(&id, log.username(), log.name()).is_some() {
                return Err(LogbookError::NameTaken {
                    username: log.username().to_string(),
                    name: log.name().to_string(),
                });
            }
            index.set_foreign(id.clone(), address.clone());
            Ok(())
        })?;
        match &existing {
            Some(slot) => slot.current.store(Arc::new(log.clone())),
            None => {
                self.write_logs()
                    .insert(id.clone(), LogSlot::new(log.clone(), true));
            }
        }
        self.cache.patch(CacheEntry::from_oplog(&log, true));
        drop(guard);
        debug!(id = %id.short(), username = %log.username(), ops = log.len(), "imported foreign log");
        Ok(self.after_commit(&log, EventKind::Import, None))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Resolve `(username, name)` to a reference pinned at the head.
    ///
    /// Served from the dscache; a missing or stale entry is rebuilt by full
    /// replay of its log.
    ///
    /// # Errors
    /// [`LogbookError::NotFound`] if no such dataset is known.
    pub fn resolve(&self, username: &Username, name: &DatasetName) -> Result<DsRef> {
        if let Some(entry) = self.cache.lookup(username, name)
            && !entry.stale
        {
            return Ok(entry.dsref());
        }
        let (_, slot) = self.find(username, name).ok_or_else(|| LogbookError::NotFound {
            reference: alias(username, name),
        })?;
        let log = slot.current.load_full();
        let state = log
            .replay()
            .map_err(|e| corrupt(format!("{}: {e}", alias(username, name))))?;
        let entry = CacheEntry::from_state(&log, &state, slot.foreign)
            .ok_or_else(|| corrupt(format!("{} did not replay a name", log.id().short())))?;
        debug!(id = %entry.id.short(), "rebuilt dscache entry");
        let dsref = entry.dsref();
        self.cache.refresh(entry);
        Ok(dsref)
    }

    /// Resolve a reference that may or may not carry a path.
    ///
    /// Without a path, the head is filled in. With a path, the path must be
    /// one of the dataset's versions and is kept.
    ///
    /// # Errors
    /// [`LogbookError::NotFound`] if the dataset or the pinned version does
    /// not exist.
    pub fn resolve_ref(&self, dsref: &DsRef) -> Result<DsRef> {
        let resolved = self.resolve(&dsref.username, &dsref.name)?;
        let Some(path) = &dsref.path else {
            return Ok(resolved);
        };
        let (_, slot) = self.lookup_slot(&dsref.username, &dsref.name)?;
        if slot.current.load().state().versions.iter().any(|v| &v.path == path) {
            Ok(resolved.with_path(Some(path.clone())))
        } else {
            Err(LogbookError::NotFound {
                reference: dsref.to_string(),
            })
        }
    }

    /// The versions of a dataset, newest first.
    ///
    /// # Errors
    /// [`LogbookError::NotFound`] if the dataset does not exist.
    pub fn versions(&self, dsref: &DsRef) -> Result<Vec<VersionInfo>> {
        let (_, slot) = self.lookup_slot(&dsref.username, &dsref.name)?;
        let log = slot.current.load_full();
        let base = DsRef::new(log.username().clone(), log.name().clone());
        Ok(log
            .state()
            .versions
            .iter()
            .rev()
            .map(|v| VersionInfo {
                dsref: base.clone().with_path(Some(v.path.clone())),
                title: v.title.clone(),
                timestamp: v.timestamp,
            })
            .collect())
    }

    /// A snapshot of a dataset's log.
    ///
    /// # Errors
    /// [`LogbookError::NotFound`] if the dataset does not exist.
    pub fn oplog(&self, dsref: &DsRef) -> Result<Oplog> {
        let (_, slot) = self.lookup_slot(&dsref.username, &dsref.name)?;
        Ok(Oplog::clone(&slot.current.load()))
    }

    /// Every known dataset, local and foreign, sorted by `username/name`.
    #[must_use]
    pub fn list(&self) -> Vec<DsRef> {
        let mut refs: Vec<DsRef> = self
            .slots()
            .values()
            .map(|slot| {
                let log = slot.current.load();
                DsRef::new(log.username().clone(), log.name().clone())
                    .with_path(log.state().head().cloned())
            })
            .collect();
        refs.sort_by(|a, b| (&a.username, &a.name).cmp(&(&b.username, &b.name)));
        refs
    }

    /// Discard the dscache and rebuild it by full replay of every log.
    ///
    /// Returns the number of entries built.
    ///
    /// # Errors
    /// [`LogbookError::CorruptLog`] if a log does not replay; the old cache
    /// is kept in that case.
    pub fn rebuild_cache(&self) -> Result<usize> {
        // Commits patch the cache under the index lock; holding it here keeps
        // their patches from landing between the snapshot and the swap.
        let guard = lock(&self.index);
        let snapshot: Vec<(Arc<Oplog>, bool)> = self
            .slots()
            .values()
            .map(|slot| (slot.current.load_full(), slot.foreign))
            .collect();
        let count = self
            .cache
            .rebuild(snapshot.iter().map(|(log, foreign)| (log.as_ref(), *foreign)))
            .map_err(|e| corrupt(format!("rebuilding dscache: {e}")))?;
        drop(guard);
        self.save_cache_best_effort();
        Ok(count)
    }

    /// Write the dscache to its configured file, if any.
    ///
    /// # Errors
    /// [`LogbookError::Cache`] if the file cannot be written.
    pub fn save_cache(&self) -> Result<()> {
        if let Some(path) = &self.cache_path {
            self.cache.save(path)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn read_logs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<OplogId, Arc<LogSlot>>> {
        self.logs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_logs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<OplogId, Arc<LogSlot>>> {
        self.logs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn slots(&self) -> HashMap<OplogId, Arc<LogSlot>> {
        self.read_logs().clone()
    }

    /// Find a dataset by `(username, name)`: local datasets through the
    /// index, foreign ones by scanning their current state.
    fn find(&self, username: &Username, name: &DatasetName) -> Option<(OplogId, Arc<LogSlot>)> {
        if username == self.username() {
            let id = lock(&self.index).index.id_for(name).cloned()?;
            let slot = self.read_logs().get(&id).cloned()?;
            return Some((id, slot));
        }
        self.read_logs().iter().find_map(|(id, slot)| {
            let log = slot.current.load();
            (slot.foreign && log.username() == username && log.name() == name)
                .then(|| (id.clone(), Arc::clone(slot)))
        })
    }

    /// Another imported log currently named `username/name`, if any.
    fn foreign_name_holder(
        &self,
        id: &OplogId,
        username: &Username,
        name: &DatasetName,
    ) -> Option<OplogId> {
        self.read_logs().iter().find_map(|(other, slot)| {
            let log = slot.current.load();
            (slot.foreign && other != id && log.username() == username && log.name() == name)
                .then(|| other.clone())
        })
    }

    fn lookup_slot(
        &self,
        username: &Username,
        name: &DatasetName,
    ) -> Result<(OplogId, Arc<LogSlot>)> {
        self.find(username, name).ok_or_else(|| LogbookError::NotFound {
            reference: alias(username, name),
        })
    }

    /// Sign `payload`, fold it onto the slot's log, persist, and commit.
    ///
    /// `update_index` receives the new index and the dataset id and may
    /// reject the commit; afterwards the dataset's index entry is pointed at
    /// the new log blob under its current name. Foreign logs fail the owner
    /// check here.
    fn append<F>(
        &self,
        ctx: &Context,
        caller: &Author,
        slot: &LogSlot,
        expected_name: &DatasetName,
        payload: OpPayload,
        update_index: F,
    ) -> Result<Oplog>
    where
        F: FnOnce(&mut BookIndex, &OplogId) -> Result<()>,
    {
        let _writer = lock(&slot.write);
        let current = slot.current.load_full();
        auth::require_owner(caller, &current)?;
        let dataset = alias(current.username(), expected_name);
        if current.name() != expected_name {
            // Renamed between lookup and lock.
            return Err(LogbookError::NotFound { reference: dataset });
        }

        let signed = sign_operation(caller, self.clock.next_timestamp(), payload)?;
        let candidate = current
            .with_appended(signed)
            .map_err(|e| append_error(&dataset, e))?;
        let address = persist::write_oplog(ctx, self.store.as_ref(), &candidate)?;

        let id = candidate.id().clone();
        let name = candidate.name().clone();
        let guard = self.commit(ctx, |index| {
            update_index(index, &id)?;
            index.set_local(name, id.clone(), address);
            Ok(())
        })?;
        slot.current.store(Arc::new(candidate.clone()));
        self.cache.patch(CacheEntry::from_oplog(&candidate, false));
        drop(guard);
        Ok(candidate)
    }

    /// Apply `update` to a copy of the root index, store it, and swap the
    /// root pointer. On success the returned guard still holds the index
    /// lock so the caller can install in-memory state before anyone else
    /// commits.
    fn commit<F>(&self, ctx: &Context, update: F) -> Result<MutexGuard<'_, IndexState>>
    where
        F: FnOnce(&mut BookIndex) -> Result<()>,
    {
        let mut state = lock(&self.index);
        let mut next = state.index.clone();
        update(&mut next)?;

        let bytes = next.to_canonical_json()?;
        ctx.check()?;
        let address = self.store.put(&bytes)?;
        ctx.check()?;
        self.store
            .swap_root(&self.root, state.address.as_ref(), &address)?;
        debug!(root = %self.root, %address, "committed root index");

        state.index = next;
        state.address = Some(address);
        Ok(state)
    }

    /// Save the cache, publish, and return the committed log's ref.
    fn after_commit(&self, log: &Oplog, kind: EventKind, previous_name: Option<String>) -> DsRef {
        let dsref = DsRef::new(log.username().clone(), log.name().clone())
            .with_path(log.state().head().cloned());
        self.save_cache_best_effort();
        self.events.publish(&LifecycleEvent {
            kind,
            id: log.id().clone(),
            dsref: dsref.clone(),
            previous_name,
        });
        dsref
    }

    fn save_cache_best_effort(&self) {
        if let Err(e) = self.save_cache() {
            warn!(error = %e, "failed to save dscache");
        }
    }
}
