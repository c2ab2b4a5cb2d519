//! Content-addressed storage abstraction for logbook.
//!
//! This crate defines the [`ContentStore`] trait, the single interface through
//! which the logbook persists serialized oplogs and its root index. The book
//! never touches files or object databases directly; it programs against the
//! trait and receives a `dyn ContentStore` at construction time.
//!
//! # Crate layout
//!
//! - [`store`]: the [`ContentStore`] trait definition.
//! - [`types`]: value types used in trait signatures ([`Address`], [`RootName`]).
//! - [`error`]: the [`StoreError`] enum returned by all trait methods.
//! - [`MemStore`]: in-memory backend, used by tests and ephemeral books.
//! - [`FsStore`]: sha256-addressed files on disk with atomic writes.

pub mod error;
pub mod store;
pub mod types;

mod fs;
mod mem;

pub use error::StoreError;
pub use fs::FsStore;
pub use mem::MemStore;
pub use store::ContentStore;
pub use types::{Address, AddressError, RootName};
