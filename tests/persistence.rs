//! Durability and atomicity of book commits.
//!
//! # What is verified
//!
//! - Reopening a book from the same store yields identical references,
//!   version stacks, and logs, for both the memory and filesystem stores.
//! - A commit that fails at any step (log blob write, index blob write,
//!   root swap) or whose context is cancelled or expired leaves the
//!   in-memory log, the dscache, and the root pointer exactly as they were.
//! - After such a failure the book keeps working and a reopen sees only
//!   committed state.

mod common;

use std::sync::Arc;
use std::time::Duration;

use logbook::context::Context;
use logbook::dsref::{DsRef, VersionSave};
use logbook::{Book, BookOptions, LogbookError};
use logbook_cas::{ContentStore, FsStore, MemStore};
use tempfile::TempDir;

use common::{FaultyStore, LogbookBuilder, addr, author, ctx, name, user};

fn snapshot(book: &Book) -> Vec<(DsRef, usize)> {
    book.list()
        .into_iter()
        .map(|r| {
            let ops = book.oplog(&r).unwrap().len();
            (r, ops)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reopen
// ---------------------------------------------------------------------------

fn populate(b: &mut LogbookBuilder) {
    let movies = b.dataset_init("movies");
    let v1 = b.commit(&movies, "first", "Qm1");
    let v2 = b.commit(&v1, "second", "Qm2");
    b.dataset_rename(&v2, "films");
    let comics = b.dataset_init("comics");
    let c1 = b.commit(&comics, "one", "QmA");
    let c2 = b.commit(&c1, "two", "QmB");
    b.delete(&c2, 1);
}

#[test]
fn reopen_memory_store_yields_identical_refs() {
    let mut b = LogbookBuilder::new("b5");
    populate(&mut b);

    let reopened = b.reopen(BookOptions::default());
    assert_eq!(snapshot(&reopened), snapshot(&b.book));
    assert_eq!(reopened.root_address(), b.book.root_address());

    let films = DsRef::new(user("b5"), name("films"));
    assert_eq!(
        reopened.versions(&films).unwrap(),
        b.book.versions(&films).unwrap()
    );
    assert_eq!(reopened.oplog(&films).unwrap(), b.book.oplog(&films).unwrap());
    assert_eq!(
        reopened.resolve(&user("b5"), &name("comics")).unwrap().path,
        b.expected_head("comics")
    );
}

#[test]
fn reopen_filesystem_store_yields_identical_refs() {
    let dir = TempDir::new().unwrap();
    let options = BookOptions {
        cache_path: Some(dir.path().join("dscache.json")),
    };
    let store: Arc<dyn ContentStore> = Arc::new(FsStore::open(dir.path().join("store")).unwrap());
    let mut b = LogbookBuilder::with_options(author("b5", 1), Arc::clone(&store), options.clone());
    populate(&mut b);
    let expected = snapshot(&b.book);
    drop(b);

    let fresh_store: Arc<dyn ContentStore> =
        Arc::new(FsStore::open(dir.path().join("store")).unwrap());
    let b = LogbookBuilder::with_options(author("b5", 1), fresh_store, options);
    assert_eq!(snapshot(&b.book), expected);
    assert!(b.book.cache().entries().iter().all(|e| !e.stale));
}

#[test]
fn clock_resumes_past_stored_timestamps() {
    let mut b = LogbookBuilder::new("b5");
    let a = b.dataset_init("a");
    b.commit(&a, "v1", "Qm1");
    let last = b.book.oplog(&a).unwrap().last_timestamp();

    let reopened = b.reopen(BookOptions::default());
    let head = reopened.resolve(&user("b5"), &name("a")).unwrap();
    let saved = reopened
        .save_version(&ctx(), &b.author, &VersionSave::on(&head, addr("Qm2"), "v2"))
        .unwrap();
    assert!(reopened.oplog(&saved).unwrap().last_timestamp() > last);
}

// ---------------------------------------------------------------------------
// Failed commits
// ---------------------------------------------------------------------------

struct Fixture {
    store: Arc<FaultyStore>,
    b: LogbookBuilder,
    head: DsRef,
}

fn fixture() -> Fixture {
    let store = Arc::new(FaultyStore::new());
    let mut b = LogbookBuilder::with_store(
        author("b5", 1),
        Arc::clone(&store) as Arc<dyn ContentStore>,
    );
    let a = b.dataset_init("a");
    let head = b.commit(&a, "v1", "Qm1");
    Fixture { store, b, head }
}

/// Run a save that is expected to fail, then check that nothing moved.
fn assert_save_fails_cleanly(f: &Fixture, ctx: &Context) -> LogbookError {
    let before = snapshot(&f.b.book);
    let root_before = f.b.book.root_address();
    let stored_root = f.store.read_root(f.b.book.root()).unwrap();
    let cache_before = f.b.book.cache().entries();

    let err = f
        .b
        .book
        .save_version(ctx, &f.b.author, &VersionSave::on(&f.head, addr("Qm2"), "v2"))
        .unwrap_err();

    assert_eq!(snapshot(&f.b.book), before);
    assert_eq!(f.b.book.root_address(), root_before);
    assert_eq!(f.store.read_root(f.b.book.root()).unwrap(), stored_root);
    assert_eq!(f.b.book.cache().entries(), cache_before);
    err
}

fn assert_recovers(f: &Fixture) {
    let saved = f
        .b
        .book
        .save_version(&ctx(), &f.b.author, &VersionSave::on(&f.head, addr("Qm2"), "v2"))
        .unwrap();
    assert_eq!(saved.path, Some(addr("Qm2")));
    let reopened = f.b.reopen(BookOptions::default());
    assert_eq!(snapshot(&reopened), snapshot(&f.b.book));
}

#[test]
fn failed_log_write_changes_nothing() {
    let f = fixture();
    f.store.fail_puts(true);
    let err = assert_save_fails_cleanly(&f, &ctx());
    assert!(matches!(err, LogbookError::Store(_)), "got {err:?}");
    f.store.fail_puts(false);
    assert_recovers(&f);
}

#[test]
fn failed_index_write_changes_nothing() {
    let f = fixture();
    // The log blob lands, the index blob does not.
    f.store.fail_puts_after(1);
    let objects_before = f.store.object_count();
    let err = assert_save_fails_cleanly(&f, &ctx());
    assert!(matches!(err, LogbookError::Store(_)), "got {err:?}");
    assert_eq!(f.store.object_count(), objects_before + 1);
    f.store.fail_puts(false);
    assert_recovers(&f);
}

#[test]
fn failed_root_swap_changes_nothing() {
    let f = fixture();
    f.store.fail_swaps(true);
    let err = assert_save_fails_cleanly(&f, &ctx());
    assert!(matches!(err, LogbookError::Store(_)), "got {err:?}");
    f.store.fail_swaps(false);
    assert_recovers(&f);
}

#[test]
fn cancelled_context_changes_nothing() {
    let f = fixture();
    let cancelled = Context::background();
    cancelled.cancel();
    let err = assert_save_fails_cleanly(&f, &cancelled);
    assert!(matches!(err, LogbookError::Cancelled), "got {err:?}");
    assert_recovers(&f);
}

#[test]
fn expired_deadline_changes_nothing() {
    let f = fixture();
    let expired = Context::with_timeout(Duration::ZERO);
    let err = assert_save_fails_cleanly(&f, &expired);
    assert!(matches!(err, LogbookError::DeadlineExceeded), "got {err:?}");
    assert_recovers(&f);
}

#[test]
fn failed_init_leaves_name_free() {
    let f = fixture();
    f.store.fail_swaps(true);
    let err = f
        .b
        .book
        .init_dataset(&ctx(), &f.b.author, name("b"))
        .unwrap_err();
    assert!(matches!(err, LogbookError::Store(_)));
    assert_eq!(f.b.book.list().len(), 1);
    assert!(f.b.book.cache().lookup(&user("b5"), &name("b")).is_none());

    f.store.fail_swaps(false);
    f.b.book.init_dataset(&ctx(), &f.b.author, name("b")).unwrap();
    assert_eq!(f.b.book.list().len(), 2);
}

#[test]
fn failed_rename_keeps_old_name() {
    let f = fixture();
    f.store.fail_puts_after(1);
    let err = f
        .b
        .book
        .rename_dataset(&ctx(), &f.b.author, &f.head, name("renamed"))
        .unwrap_err();
    assert!(matches!(err, LogbookError::Store(_)));
    assert!(f.b.book.resolve(&user("b5"), &name("a")).is_ok());
    assert!(matches!(
        f.b.book.resolve(&user("b5"), &name("renamed")),
        Err(LogbookError::NotFound { .. })
    ));
}

#[test]
fn concurrent_writer_on_same_root_is_detected() {
    let store: Arc<dyn ContentStore> = Arc::new(MemStore::new());
    let mut first = LogbookBuilder::with_store(author("b5", 1), Arc::clone(&store));
    let second = first.reopen(BookOptions::default());
    first.dataset_init("a");

    // `second` still holds the old root; its commit must not clobber `first`.
    let err = second
        .init_dataset(&ctx(), &first.author, name("b"))
        .unwrap_err();
    assert!(matches!(err, LogbookError::Store(_)), "got {err:?}");

    let reopened = first.reopen(BookOptions::default());
    let names: Vec<String> = reopened.list().iter().map(ToString::to_string).collect();
    assert_eq!(names, ["b5/a"]);
}
