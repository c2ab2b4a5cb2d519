//! Error types for content-addressed store operations.
//!
//! [`StoreError`] is the single error type returned by all
//! [`ContentStore`](crate::ContentStore) methods. Callers match on variants
//! (missing object, root CAS mismatch, corrupted blob) rather than parsing
//! messages.

use thiserror::Error;

use crate::types::{Address, AddressError, RootName};

/// Errors returned by [`ContentStore`](crate::ContentStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object is stored under the requested address.
    #[error("object not found: {address}")]
    NotFound {
        /// The address that was looked up.
        address: Address,
    },

    /// A root pointer swap failed because its current value did not match
    /// the expected old value.
    #[error("root `{root}` conflict: expected {}, found {}", display_opt(expected.as_ref()), display_opt(actual.as_ref()))]
    RootConflict {
        /// The root pointer that could not be updated.
        root: RootName,
        /// What the caller expected the root to hold.
        expected: Option<Address>,
        /// What the root actually held.
        actual: Option<Address>,
    },

    /// Stored bytes no longer hash to the address they were stored under.
    #[error("object {address} is corrupt: content hash mismatch")]
    Corrupt {
        /// The address of the corrupted object.
        address: Address,
    },

    /// A string could not be parsed as an address or root name.
    #[error(transparent)]
    Invalid(#[from] AddressError),

    /// An I/O error occurred in a filesystem-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend failed in a way that fits no other variant.
    #[error("store backend error: {message}")]
    Backend {
        /// Freeform error description from the backend.
        message: String,
    },
}

fn display_opt(addr: Option<&Address>) -> String {
    addr.map_or_else(|| "<none>".to_owned(), ToString::to_string)
}
