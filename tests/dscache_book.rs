//! The dataset cache as seen through the book.
//!
//! # What is verified
//!
//! - Every mutation patches the cache to exactly what a full replay gives.
//! - The cache can be discarded, marked stale, or left behind on disk and
//!   the book still resolves correct heads.
//! - A persisted cache is reloaded on open; a lagging or unreadable file is
//!   repaired rather than trusted.

mod common;

use std::fs;
use std::sync::Arc;

use logbook::BookOptions;
use logbook::dscache::{CacheEntry, DsCache};
use logbook::dsref::VersionSave;
use logbook_cas::{ContentStore, MemStore};
use tempfile::TempDir;

use common::{LogbookBuilder, addr, author, ctx, name, user};

fn replayed_entry(b: &LogbookBuilder, dataset: &str) -> CacheEntry {
    let dsref = b.book.resolve(&user("b5"), &name(dataset)).unwrap();
    let log = b.book.oplog(&dsref).unwrap();
    let state = log.replay().unwrap();
    CacheEntry::from_state(&log, &state, false).unwrap()
}

#[test]
fn mutations_patch_cache_to_replayed_state() {
    let mut b = LogbookBuilder::new("b5");
    let a = b.dataset_init("a");
    assert_eq!(b.book.cache().lookup(&user("b5"), &name("a")).unwrap(), replayed_entry(&b, "a"));

    let v1 = b.commit(&a, "v1", "Qm1");
    let v2 = b.commit(&v1, "v2", "Qm2");
    assert_eq!(b.book.cache().lookup(&user("b5"), &name("a")).unwrap(), replayed_entry(&b, "a"));

    let renamed = b.dataset_rename(&v2, "b");
    assert!(b.book.cache().lookup(&user("b5"), &name("a")).is_none());
    assert_eq!(b.book.cache().lookup(&user("b5"), &name("b")).unwrap(), replayed_entry(&b, "b"));

    b.delete(&renamed, 2);
    let entry = b.book.cache().lookup(&user("b5"), &name("b")).unwrap();
    assert_eq!(entry, replayed_entry(&b, "b"));
    assert_eq!(entry.head, None);
    assert_eq!(entry.version_count, 0);
    assert_eq!(entry.op_count, 5);
    assert_eq!(b.book.cache().len(), 1);
}

#[test]
fn cleared_cache_is_rebuilt_on_lookup() {
    let mut b = LogbookBuilder::new("b5");
    let a = b.dataset_init("a");
    b.commit(&a, "v1", "Qm1");
    b.book.cache().clear();
    assert!(b.book.cache().is_empty());

    let resolved = b.book.resolve(&user("b5"), &name("a")).unwrap();
    assert_eq!(resolved.path, Some(addr("Qm1")));
    assert_eq!(b.book.cache().len(), 1);
}

#[test]
fn stale_entry_is_rebuilt_on_lookup() {
    let mut b = LogbookBuilder::new("b5");
    let a = b.dataset_init("a");
    b.commit(&a, "v1", "Qm1");
    let id = b.book.oplog(&a).unwrap().id().clone();

    assert!(b.book.cache().mark_stale(&id));
    assert!(b.book.cache().get(&id).unwrap().stale);
    b.book.resolve(&user("b5"), &name("a")).unwrap();
    assert!(!b.book.cache().get(&id).unwrap().stale);
}

#[test]
fn rebuild_cache_counts_every_log() {
    let mut b = LogbookBuilder::new("b5");
    for n in ["a", "b", "c"] {
        let dsref = b.dataset_init(n);
        b.commit(&dsref, "v1", &format!("Qm-{n}"));
    }
    let before = b.book.cache().entries();
    b.book.cache().clear();
    assert_eq!(b.book.rebuild_cache().unwrap(), 3);
    assert_eq!(b.book.cache().entries(), before);
}

// ---------------------------------------------------------------------------
// On disk
// ---------------------------------------------------------------------------

fn cached_book(dir: &TempDir, store: &Arc<dyn ContentStore>) -> LogbookBuilder {
    LogbookBuilder::with_options(
        author("b5", 1),
        Arc::clone(store),
        BookOptions {
            cache_path: Some(dir.path().join("dscache.json")),
        },
    )
}

#[test]
fn cache_file_written_after_each_mutation() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn ContentStore> = Arc::new(MemStore::new());
    let mut b = cached_book(&dir, &store);
    let a = b.dataset_init("a");
    b.commit(&a, "v1", "Qm1");

    let on_disk = DsCache::load(&dir.path().join("dscache.json")).unwrap();
    assert_eq!(on_disk.entries(), b.book.cache().entries());
}

#[test]
fn lagging_cache_file_is_marked_stale_and_repaired() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn ContentStore> = Arc::new(MemStore::new());
    let mut b = cached_book(&dir, &store);
    let a = b.dataset_init("a");
    let v1 = b.commit(&a, "v1", "Qm1");

    // Commit more through a book that does not write the cache file.
    let uncached = b.reopen(BookOptions::default());
    uncached
        .save_version(&ctx(), &b.author, &VersionSave::on(&v1, addr("Qm2"), "v2"))
        .unwrap();

    let reopened = cached_book(&dir, &store);
    let entry = reopened.book.cache().lookup(&user("b5"), &name("a")).unwrap();
    assert!(entry.stale);
    assert_eq!(entry.head, Some(addr("Qm1")));

    let resolved = reopened.book.resolve(&user("b5"), &name("a")).unwrap();
    assert_eq!(resolved.path, Some(addr("Qm2")));
    assert!(!reopened.book.cache().lookup(&user("b5"), &name("a")).unwrap().stale);
}

#[test]
fn unreadable_cache_file_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn ContentStore> = Arc::new(MemStore::new());
    let mut b = cached_book(&dir, &store);
    let a = b.dataset_init("a");
    b.commit(&a, "v1", "Qm1");

    fs::write(dir.path().join("dscache.json"), b"{ definitely not a cache").unwrap();
    let reopened = cached_book(&dir, &store);
    let entry = reopened.book.cache().lookup(&user("b5"), &name("a")).unwrap();
    assert!(!entry.stale);
    assert_eq!(entry.head, Some(addr("Qm1")));
}

#[test]
fn cache_entries_for_unknown_logs_are_dropped() {
    let dir = TempDir::new().unwrap();
    let mut b = cached_book(&dir, &(Arc::new(MemStore::new()) as Arc<dyn ContentStore>));
    b.dataset_init("ghost");

    // A different store knows nothing about "ghost".
    let fresh: Arc<dyn ContentStore> = Arc::new(MemStore::new());
    let reopened = cached_book(&dir, &fresh);
    assert!(reopened.book.cache().is_empty());
    assert!(reopened.book.list().is_empty());
}
