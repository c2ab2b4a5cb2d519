//! Capability checks: only the book's own key may write, and only to logs
//! it owns.
//!
//! # What is verified
//!
//! - Every mutation by a caller other than the local identity fails with
//!   `Unauthorized` and appends nothing, even when the usernames match.
//! - Imported foreign logs are read-only for the local identity.
//! - A book cannot be opened with a key other than the one that created it.

mod common;

use std::sync::Arc;

use logbook::dsref::{DsRef, VersionSave};
use logbook::identity::{KeyProvider, Keyring};
use logbook::{Book, LogbookError};
use logbook_cas::MemStore;

use common::{LogbookBuilder, addr, author, ctx, name, user};

fn assert_unauthorized<T: std::fmt::Debug>(result: Result<T, LogbookError>) {
    match result {
        Err(LogbookError::Unauthorized { .. }) => {}
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[test]
fn other_identity_cannot_mutate() {
    let mut b = LogbookBuilder::new("b5");
    let a = b.dataset_init("a");
    let v1 = b.commit(&a, "v1", "Qm1");
    let root_before = b.book.root_address();
    let ops_before = b.book.oplog(&a).unwrap().len();

    let ramfox = author("ramfox", 2);
    assert_unauthorized(b.book.init_dataset(&ctx(), &ramfox, name("mine")));
    assert_unauthorized(b.book.save_version(
        &ctx(),
        &ramfox,
        &VersionSave::on(&v1, addr("Qm2"), "hijack"),
    ));
    assert_unauthorized(b.book.rename_dataset(&ctx(), &ramfox, &a, name("stolen")));
    assert_unauthorized(b.book.delete_versions(&ctx(), &ramfox, &a, 1));

    assert_eq!(b.book.root_address(), root_before);
    assert_eq!(b.book.oplog(&a).unwrap().len(), ops_before);
    assert_eq!(b.book.list(), vec![v1]);
}

#[test]
fn same_username_with_other_key_is_rejected() {
    let mut b = LogbookBuilder::new("b5");
    let a = b.dataset_init("a");
    let impostor = author("b5", 99);
    assert_eq!(impostor.username(), b.author.username());

    assert_unauthorized(b.book.save_version(
        &ctx(),
        &impostor,
        &VersionSave::on(&a, addr("Qm1"), "v1"),
    ));
    assert_eq!(b.book.oplog(&a).unwrap().len(), 1);
}

#[test]
fn foreign_logs_are_read_only() {
    let mut ramfox = LogbookBuilder::with_store(author("ramfox", 2), Arc::new(MemStore::new()));
    let comics = ramfox.dataset_init("comics");
    ramfox.commit(&comics, "v1", "Qm1");
    let exported = ramfox
        .book
        .oplog(&comics)
        .unwrap()
        .to_canonical_json()
        .unwrap();

    let b = LogbookBuilder::new("b5");
    b.keys.insert(user("ramfox"), ramfox.author.id());
    let imported = b.book.import_foreign(&ctx(), &exported).unwrap();
    assert_eq!(imported.to_string(), "ramfox/comics@Qm1");

    let root_before = b.book.root_address();
    assert_unauthorized(b.book.save_version(
        &ctx(),
        &b.author,
        &VersionSave::on(&imported, addr("Qm2"), "v2"),
    ));
    assert_unauthorized(b.book.delete_versions(&ctx(), &b.author, &imported, 1));
    assert_unauthorized(
        b.book
            .rename_dataset(&ctx(), &b.author, &imported, name("mine")),
    );
    assert_eq!(b.book.root_address(), root_before);
    assert_eq!(b.book.oplog(&imported).unwrap().len(), 2);
}

#[test]
fn renaming_foreign_log_onto_taken_name_is_unauthorized() {
    let mut ramfox = LogbookBuilder::with_store(author("ramfox", 2), Arc::new(MemStore::new()));
    let comics = ramfox.dataset_init("comics");
    let exported = ramfox
        .book
        .oplog(&comics)
        .unwrap()
        .to_canonical_json()
        .unwrap();

    let mut b = LogbookBuilder::new("b5");
    b.dataset_init("taken");
    b.keys.insert(user("ramfox"), ramfox.author.id());
    let imported = b.book.import_foreign(&ctx(), &exported).unwrap();

    // Ownership is decided before the name is looked at.
    assert_unauthorized(
        b.book
            .rename_dataset(&ctx(), &b.author, &imported, name("taken")),
    );
    assert_eq!(b.book.oplog(&imported).unwrap().len(), 1);
}

#[test]
fn reopening_with_another_key_is_unauthorized() {
    let b = LogbookBuilder::new("b5");
    b.book.init_dataset(&ctx(), &b.author, name("a")).unwrap();

    let impostor = Arc::new(Keyring::new(author("b5", 42)));
    let result = Book::open(&ctx(), Arc::clone(&b.store), impostor as Arc<dyn KeyProvider>);
    assert_unauthorized(result);
}

#[test]
fn every_stored_op_is_signed_by_the_owner() {
    let mut b = LogbookBuilder::new("b5");
    let a = b.dataset_init("a");
    let v1 = b.commit(&a, "v1", "Qm1");
    b.dataset_rename(&v1, "b");

    let log = b.book.oplog(&DsRef::new(user("b5"), name("b"))).unwrap();
    log.verify_owner(&b.author.id()).unwrap();
    assert!(log.ops().iter().all(|op| op.verify()));
    assert!(log.ops().iter().all(|op| op.op.author == b.author.id()));
}
