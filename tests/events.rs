//! Lifecycle events published by the book.
//!
//! # What is verified
//!
//! - Each committed mutation publishes exactly one event of the right kind,
//!   carrying the dataset as it is after the change.
//! - Renames carry the previous name.
//! - A mutation that fails publishes nothing.
//! - Subscribers are called in registration order.

mod common;

use std::sync::{Arc, Mutex};

use logbook::LogbookError;
use logbook::events::{EventKind, LifecycleEvent};
use logbook_cas::{ContentStore, MemStore};

use common::{FaultyStore, LogbookBuilder, addr, author, ctx, name, user};

fn recorder(b: &LogbookBuilder) -> Arc<Mutex<Vec<LifecycleEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    b.book
        .events()
        .subscribe(Box::new(move |event| sink.lock().unwrap().push(event.clone())));
    seen
}

fn kinds(seen: &Mutex<Vec<LifecycleEvent>>) -> Vec<EventKind> {
    seen.lock().unwrap().iter().map(|e| e.kind).collect()
}

#[test]
fn every_mutation_publishes_one_event() {
    let mut b = LogbookBuilder::new("b5");
    let seen = recorder(&b);

    let a = b.dataset_init("a");
    let v1 = b.commit(&a, "v1", "Qm1");
    let v2 = b.commit(&v1, "v2", "Qm2");
    let renamed = b.dataset_rename(&v2, "b");
    let after_delete = b.delete(&renamed, 1);

    assert_eq!(
        kinds(&seen),
        [
            EventKind::Init,
            EventKind::VersionSave,
            EventKind::VersionSave,
            EventKind::Rename,
            EventKind::VersionDelete,
        ]
    );

    let events = seen.lock().unwrap();
    let id = b.book.oplog(&after_delete).unwrap().id().clone();
    assert!(events.iter().all(|e| e.id == id));
    assert_eq!(events[2].dsref, v2);
    assert_eq!(events[3].dsref.to_string(), "b5/b@Qm2");
    assert_eq!(events[3].previous_name.as_deref(), Some("a"));
    assert_eq!(events[4].dsref.path, Some(addr("Qm1")));
    assert!(events.iter().filter(|e| e.kind != EventKind::Rename).all(|e| e.previous_name.is_none()));
}

#[test]
fn import_publishes_import_event() {
    let mut ramfox = LogbookBuilder::with_store(author("ramfox", 2), Arc::new(MemStore::new()));
    let comics = ramfox.dataset_init("comics");
    ramfox.commit(&comics, "v1", "Qm1");
    let bytes = ramfox.book.oplog(&comics).unwrap().to_canonical_json().unwrap();

    let b5 = LogbookBuilder::new("b5");
    b5.keys.insert(user("ramfox"), ramfox.author.id());
    let seen = recorder(&b5);
    let imported = b5.book.import_foreign(&ctx(), &bytes).unwrap();

    let events = seen.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Import);
    assert_eq!(events[0].dsref, imported);
}

#[test]
fn failed_mutations_publish_nothing() {
    let store = Arc::new(FaultyStore::new());
    let mut b = LogbookBuilder::with_store(author("b5", 1), Arc::clone(&store) as Arc<dyn ContentStore>);
    let a = b.dataset_init("a");
    let seen = recorder(&b);

    assert!(matches!(
        b.book.init_dataset(&ctx(), &b.author, name("a")),
        Err(LogbookError::AlreadyExists { .. })
    ));
    store.fail_swaps(true);
    assert!(b.book.init_dataset(&ctx(), &b.author, name("b")).is_err());
    assert!(b.book.rename_dataset(&ctx(), &b.author, &a, name("c")).is_err());
    store.fail_swaps(false);

    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn subscribers_run_in_registration_order() {
    let mut b = LogbookBuilder::new("b5");
    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let sink = Arc::clone(&order);
        b.book
            .events()
            .subscribe(Box::new(move |event| sink.lock().unwrap().push((tag, event.kind))));
    }
    assert_eq!(b.book.events().subscriber_count(), 2);

    b.dataset_init("a");
    assert_eq!(
        *order.lock().unwrap(),
        [("first", EventKind::Init), ("second", EventKind::Init)]
    );
}
