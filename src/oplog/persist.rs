//! Oplog persistence: store encoded logs as content-addressed blobs.
//!
//! A log is written whole, as its canonical JSON, and is addressed by the
//! hash of those bytes. Logs are never updated in place: an append writes a
//! new blob, and the book's root index is what moves to point at it.
//!
//! # Example flow
//! ```text
//! write_oplog(ctx, store, &log)   → address
//!   ├── ctx.check()
//!   └── store.put(canonical json) → address
//! read_oplog(ctx, store, &addr)   → Oplog
//!   ├── ctx.check()
//!   ├── store.get(addr)           → bytes
//!   └── Oplog::from_json(bytes)   (signatures, owner, id, replay)
//! ```

use logbook_cas::{Address, ContentStore, StoreError};
use thiserror::Error;
use tracing::{debug, trace};

use crate::context::{Context, ContextError};
use crate::oplog::log::{Oplog, OplogError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors reading or writing an oplog blob.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The context was cancelled or expired before the store call.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The content store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The blob at `address` is not a valid oplog.
    #[error("oplog at {address} is invalid: {source}")]
    Invalid {
        /// Where the blob was read from.
        address: Address,
        /// What was wrong with it.
        #[source]
        source: OplogError,
    },

    /// The log could not be encoded.
    #[error("encoding oplog: {0}")]
    Encoding(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Read / write
// ---------------------------------------------------------------------------

/// Encode `log` and put it into `store`.
///
/// # Errors
/// Returns an error if the context has ended, encoding fails, or the store
/// rejects the write.
pub fn write_oplog(
    ctx: &Context,
    store: &dyn ContentStore,
    log: &Oplog,
) -> Result<Address, PersistError> {
    let bytes = log.to_canonical_json()?;
    ctx.check()?;
    let address = store.put(&bytes)?;
    debug!(
        id = %log.id().short(),
        ops = log.len(),
        %address,
        "wrote oplog"
    );
    Ok(address)
}

/// Fetch and verify the log stored at `address`.
///
/// # Errors
/// Returns an error if the context has ended, the blob cannot be read, or
/// it does not decode and verify as an oplog.
pub fn read_oplog(
    ctx: &Context,
    store: &dyn ContentStore,
    address: &Address,
) -> Result<Oplog, PersistError> {
    ctx.check()?;
    let bytes = store.get(address)?;
    trace!(%address, len = bytes.len(), "read oplog blob");
    Oplog::from_json(&bytes).map_err(|source| PersistError::Invalid {
        address: address.clone(),
        source,
    })
}
