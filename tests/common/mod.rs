//! Shared test helpers for logbook integration tests.
//!
//! Every test builds its own book over an in-memory store (or a temp
//! directory) via [`LogbookBuilder`], which also records the version stack
//! each dataset is expected to have so tests can compare against it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use logbook::context::Context;
use logbook::dsref::{DsRef, VersionSave};
use logbook::identity::{Author, KeyProvider, Keyring};
use logbook::model::types::{DatasetName, Username};
use logbook::{Book, BookOptions};
use logbook_cas::{Address, ContentStore, MemStore, RootName, StoreError};

// ---------------------------------------------------------------------------
// Small constructors
// ---------------------------------------------------------------------------

pub fn user(s: &str) -> Username {
    Username::new(s).expect("valid username")
}

pub fn name(s: &str) -> DatasetName {
    DatasetName::new(s).expect("valid dataset name")
}

/// A deterministic author: the same `(username, seed)` always yields the
/// same key.
pub fn author(username: &str, seed: u8) -> Author {
    Author::from_bytes(user(username), &[seed; 32])
}

/// A fake version address.
pub fn addr(s: &str) -> Address {
    Address::new(s).expect("valid address")
}

pub fn ctx() -> Context {
    Context::background()
}

// ---------------------------------------------------------------------------
// LogbookBuilder
// ---------------------------------------------------------------------------

/// Builds a logbook step by step, tracking the expected version stack of
/// each dataset by name.
pub struct LogbookBuilder {
    pub book: Book,
    pub author: Author,
    pub keys: Arc<Keyring>,
    pub store: Arc<dyn ContentStore>,
    pub expected: HashMap<String, Vec<Address>>,
}

impl LogbookBuilder {
    /// A book for `username` (key seed 1) over a fresh [`MemStore`].
    pub fn new(username: &str) -> Self {
        Self::with_store(author(username, 1), Arc::new(MemStore::new()))
    }

    pub fn with_store(author: Author, store: Arc<dyn ContentStore>) -> Self {
        Self::with_options(author, store, BookOptions::default())
    }

    pub fn with_options(author: Author, store: Arc<dyn ContentStore>, options: BookOptions) -> Self {
        let keys = Arc::new(Keyring::new(author.clone()));
        let book = Book::open_with(
            &ctx(),
            Arc::clone(&store),
            Arc::clone(&keys) as Arc<dyn KeyProvider>,
            options,
        )
        .expect("open book");
        Self {
            book,
            author,
            keys,
            store,
            expected: HashMap::new(),
        }
    }

    /// Reopen the same store as the same author.
    pub fn reopen(&self, options: BookOptions) -> Book {
        Book::open_with(
            &ctx(),
            Arc::clone(&self.store),
            Arc::clone(&self.keys) as Arc<dyn KeyProvider>,
            options,
        )
        .expect("reopen book")
    }

    pub fn dataset_init(&mut self, dsname: &str) -> DsRef {
        let dsref = self
            .book
            .init_dataset(&ctx(), &self.author, name(dsname))
            .expect("init dataset");
        self.expected.insert(dsname.to_owned(), Vec::new());
        dsref
    }

    pub fn dataset_rename(&mut self, dsref: &DsRef, new_name: &str) -> DsRef {
        self.ensure_author_allowed(dsref);
        let renamed = self
            .book
            .rename_dataset(&ctx(), &self.author, dsref, name(new_name))
            .expect("rename dataset");
        let versions = self.expected.remove(dsref.name.as_str()).unwrap_or_default();
        self.expected.insert(new_name.to_owned(), versions);
        renamed
    }

    /// Save `path` on top of `dsref.path`.
    pub fn commit(&mut self, dsref: &DsRef, title: &str, path: &str) -> DsRef {
        self.ensure_author_allowed(dsref);
        let saved = self
            .book
            .save_version(&ctx(), &self.author, &VersionSave::on(dsref, addr(path), title))
            .expect("save version");
        self.expected
            .entry(dsref.name.to_string())
            .or_default()
            .push(addr(path));
        saved
    }

    pub fn delete(&mut self, dsref: &DsRef, count: u32) -> DsRef {
        self.ensure_author_allowed(dsref);
        let head = self
            .book
            .delete_versions(&ctx(), &self.author, dsref, count)
            .expect("delete versions");
        let versions = self.expected.entry(dsref.name.to_string()).or_default();
        versions.truncate(versions.len() - count as usize);
        head
    }

    /// The head the builder expects `dsname` to have.
    pub fn expected_head(&self, dsname: &str) -> Option<Address> {
        self.expected.get(dsname)?.last().cloned()
    }

    fn ensure_author_allowed(&self, dsref: &DsRef) {
        assert_eq!(
            &dsref.username,
            self.author.username(),
            "cannot write dataset of {}, book owned by {}",
            dsref.username,
            self.author.username()
        );
    }
}

// ---------------------------------------------------------------------------
// FaultyStore
// ---------------------------------------------------------------------------

/// A [`MemStore`] that can be told to fail writes.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemStore,
    fail_puts: AtomicBool,
    fail_swaps: AtomicBool,
    puts_before_failure: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `put` from now on.
    pub fn fail_puts(&self, on: bool) {
        self.fail_puts.store(on, Ordering::SeqCst);
    }

    /// Let `n` more puts succeed, then fail the rest.
    pub fn fail_puts_after(&self, n: usize) {
        self.puts_before_failure.store(n, Ordering::SeqCst);
        self.fail_puts(true);
    }

    /// Fail every `swap_root` from now on.
    pub fn fail_swaps(&self, on: bool) {
        self.fail_swaps.store(on, Ordering::SeqCst);
    }

    pub fn object_count(&self) -> usize {
        self.inner.object_count()
    }

    fn injected(op: &str) -> StoreError {
        StoreError::Backend {
            message: format!("injected {op} failure"),
        }
    }
}

impl ContentStore for FaultyStore {
    fn get(&self, address: &Address) -> Result<Vec<u8>, StoreError> {
        self.inner.get(address)
    }

    fn put(&self, bytes: &[u8]) -> Result<Address, StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            let allowed = self
                .puts_before_failure
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !allowed {
                return Err(Self::injected("put"));
            }
        }
        self.inner.put(bytes)
    }

    fn has(&self, address: &Address) -> Result<bool, StoreError> {
        self.inner.has(address)
    }

    fn read_root(&self, root: &RootName) -> Result<Option<Address>, StoreError> {
        self.inner.read_root(root)
    }

    fn swap_root(
        &self,
        root: &RootName,
        expected: Option<&Address>,
        new: &Address,
    ) -> Result<(), StoreError> {
        if self.fail_swaps.load(Ordering::SeqCst) {
            return Err(Self::injected("swap_root"));
        }
        self.inner.swap_root(root, expected, new)
    }
}
