//! The [`ContentStore`] trait: the abstraction boundary between the logbook
//! and wherever its bytes live.
//!
//! Two method groups:
//!
//! | Group   | Methods                       | Semantics                          |
//! |---------|-------------------------------|------------------------------------|
//! | Objects | `get`, `put`, `has`           | immutable, addressed by content    |
//! | Roots   | `read_root`, `swap_root`      | named mutable pointers, CAS update |
//!
//! Objects are never overwritten or deleted through this interface. Roots are
//! the only mutable state, and they only move through compare-and-swap, which
//! makes a root swap the natural commit point for multi-object writes.

use crate::error::StoreError;
use crate::types::{Address, RootName};

/// A content-addressed object store with named root pointers.
///
/// Implementations must be safe to share across threads. The trait is
/// object-safe; the logbook holds an `Arc<dyn ContentStore>`.
pub trait ContentStore: Send + Sync {
    /// Read the bytes stored at `address`.
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored there.
    fn get(&self, address: &Address) -> Result<Vec<u8>, StoreError>;

    /// Store `bytes` and return their content address.
    ///
    /// Idempotent: storing the same bytes twice yields the same address.
    fn put(&self, bytes: &[u8]) -> Result<Address, StoreError>;

    /// Return `true` if an object is stored at `address`.
    fn has(&self, address: &Address) -> Result<bool, StoreError>;

    /// Read a root pointer, returning `None` if it has never been written.
    fn read_root(&self, root: &RootName) -> Result<Option<Address>, StoreError>;

    /// Atomically move a root pointer from `expected` to `new`.
    ///
    /// `expected == None` means the root must not exist yet. On mismatch the
    /// root is left untouched and [`StoreError::RootConflict`] is returned.
    fn swap_root(
        &self,
        root: &RootName,
        expected: Option<&Address>,
        new: &Address,
    ) -> Result<(), StoreError>;
}
