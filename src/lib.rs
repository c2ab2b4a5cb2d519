//! logbook: signed, append-only operation logs for versioned datasets.
//!
//! Each identity keeps a [`Book`](book::Book) of per-dataset
//! [`Oplog`](oplog::Oplog)s. Every operation is signed by the dataset's
//! owner, folded to derive current state, and persisted to a
//! [`ContentStore`](logbook_cas::ContentStore). A derived cache
//! ([`dscache`]) serves name lookups without replaying logs.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use logbook::book::Book;
//! use logbook::context::Context;
//! use logbook::dsref::VersionSave;
//! use logbook::identity::{Author, Keyring};
//! use logbook::model::types::{DatasetName, Username};
//! use logbook_cas::{Address, MemStore};
//!
//! let ctx = Context::background();
//! let b5 = Author::generate(Username::new("b5").unwrap());
//! let book = Book::open(
//!     &ctx,
//!     Arc::new(MemStore::new()),
//!     Arc::new(Keyring::new(b5.clone())),
//! )
//! .unwrap();
//!
//! let movies = book
//!     .init_dataset(&ctx, &b5, DatasetName::new("movies").unwrap())
//!     .unwrap();
//! let v1 = VersionSave::on(&movies, Address::new("Qm1").unwrap(), "first");
//! let head = book.save_version(&ctx, &b5, &v1).unwrap();
//! assert_eq!(head.to_string(), "b5/movies@Qm1");
//! ```

pub mod book;
pub mod clock;
pub mod config;
pub mod context;
pub mod dscache;
pub mod dsref;
pub mod error;
pub mod events;
pub mod identity;
pub mod model;
pub mod oplog;

pub use book::{Book, BookOptions};
pub use error::LogbookError;
