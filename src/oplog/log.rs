//! The append-only oplog of one dataset.
//!
//! An [`Oplog`] belongs to exactly one owner key. It starts with a signed Init
//! operation, from which its stable [`OplogId`] is derived, and grows only by
//! [`Oplog::with_appended`], which returns a *new* log and leaves the
//! receiver untouched. The materialized [`DatasetState`] is kept alongside
//! the operations and advanced with the incremental fold on every append.
//!
//! # Encoding
//!
//! ```text
//! {"id":"…","owner":"<hex key>","username":"b5","ops":[{"op":{…},"signature":"…"}, …]}
//! ```
//!
//! Decoding ([`Oplog::from_json`]) re-verifies everything: every signature,
//! every author, the derived id, and a full replay. A log that fails any
//! check is rejected as a whole.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::identity::{Author, AuthorId};
use crate::model::types::{DatasetName, OplogId, Username};
use crate::oplog::fold::{self, DatasetState, FoldError};
use crate::oplog::types::{OpPayload, Operation, SignedOperation};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors building, extending, or decoding an [`Oplog`].
#[derive(Debug, Error)]
pub enum OplogError {
    /// The operation is not legal in the current state.
    #[error(transparent)]
    Fold(#[from] FoldError),

    /// An operation's signature does not verify against its author.
    #[error("operation {index} has an invalid signature")]
    InvalidSignature {
        /// Position of the operation in the log.
        index: usize,
    },

    /// An operation was authored by someone other than the log's owner.
    #[error("operation {index} was authored by {actual}, log is owned by {expected}")]
    NotOwner {
        /// Position of the operation in the log (the would-be position for
        /// an append).
        index: usize,
        /// The log owner.
        expected: AuthorId,
        /// The operation's author.
        actual: AuthorId,
    },

    /// The log has no operations.
    #[error("oplog has no operations")]
    Empty,

    /// The recorded id does not match the one derived from the Init op.
    #[error("oplog id {recorded} does not match derived id {derived}")]
    IdMismatch {
        /// Id found in the encoded log.
        recorded: OplogId,
        /// Id derived from its Init operation.
        derived: OplogId,
    },

    /// JSON encoding or decoding failed.
    #[error("oplog encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Signing helper
// ---------------------------------------------------------------------------

/// Build and sign an operation as `author`.
///
/// # Errors
/// Returns an error if the operation cannot be serialized for signing.
pub fn sign_operation(
    author: &Author,
    timestamp: i64,
    payload: OpPayload,
) -> Result<SignedOperation, serde_json::Error> {
    let op = Operation {
        timestamp,
        author: author.id(),
        payload,
    };
    let signature = author.sign(&op.signing_bytes()?);
    Ok(SignedOperation { op, signature })
}

fn derive_id(init: &SignedOperation) -> Result<OplogId, serde_json::Error> {
    Ok(OplogId::derive(&serde_json::to_vec(init)?))
}

// ---------------------------------------------------------------------------
// Oplog
// ---------------------------------------------------------------------------

/// An ordered, signed, single-owner operation log for one dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Oplog {
    id: OplogId,
    owner: AuthorId,
    username: Username,
    name: DatasetName,
    ops: Vec<SignedOperation>,
    state: DatasetState,
}

/// Wire form of an [`Oplog`]. Field order is the canonical order.
#[derive(Serialize, Deserialize)]
struct OplogDocument {
    id: OplogId,
    owner: AuthorId,
    username: Username,
    ops: Vec<SignedOperation>,
}

impl Oplog {
    /// Start a new log owned by `author` with a signed Init operation.
    ///
    /// # Errors
    /// Returns an error if the Init operation cannot be encoded.
    pub fn init(author: &Author, name: DatasetName, timestamp: i64) -> Result<Self, OplogError> {
        let init = sign_operation(author, timestamp, OpPayload::Init { name: name.clone() })?;
        let id = derive_id(&init)?;
        let state = fold::apply(&DatasetState::empty(), &init.op)?;
        debug!(id = %id.short(), owner = %author.id().short(), "initialized oplog");
        Ok(Self {
            id,
            owner: author.id(),
            username: author.username().clone(),
            name,
            ops: vec![init],
            state,
        })
    }

    /// Rebuild a log from its parts, verifying it wholesale.
    ///
    /// # Errors
    /// Returns an error if the log is empty, any signature fails, any
    /// operation is not authored by `owner`, the id does not match the Init
    /// operation, or the operations do not replay.
    pub fn from_parts(
        id: OplogId,
        owner: AuthorId,
        username: Username,
        ops: Vec<SignedOperation>,
    ) -> Result<Self, OplogError> {
        let first = ops.first().ok_or(OplogError::Empty)?;
        for (index, signed) in ops.iter().enumerate() {
            if signed.op.author != owner {
                return Err(OplogError::NotOwner {
                    index,
                    expected: owner,
                    actual: signed.op.author,
                });
            }
            if !signed.verify() {
                return Err(OplogError::InvalidSignature { index });
            }
        }
        let derived = derive_id(first)?;
        if derived != id {
            return Err(OplogError::IdMismatch {
                recorded: id,
                derived,
            });
        }
        let state = fold::materialize(ops.iter().map(|s| &s.op))?;
        let name = state.name.clone().ok_or(OplogError::Empty)?;
        Ok(Self {
            id,
            owner,
            username,
            name,
            ops,
            state,
        })
    }

    /// Return a new log with `signed` appended.
    ///
    /// The operation must be signed by the log owner and must fold cleanly
    /// onto the current state. `self` is never modified.
    ///
    /// # Errors
    /// Returns an error if the author is not the owner, the signature does
    /// not verify, or the fold rejects the operation.
    pub fn with_appended(&self, signed: SignedOperation) -> Result<Self, OplogError> {
        let index = self.ops.len();
        if signed.op.author != self.owner {
            return Err(OplogError::NotOwner {
                index,
                expected: self.owner,
                actual: signed.op.author,
            });
        }
        if !signed.verify() {
            return Err(OplogError::InvalidSignature { index });
        }
        let state = fold::apply(&self.state, &signed.op)?;
        let mut ops = Vec::with_capacity(self.ops.len() + 1);
        ops.extend_from_slice(&self.ops);
        ops.push(signed);
        Ok(Self {
            id: self.id.clone(),
            owner: self.owner,
            username: self.username.clone(),
            name: state.name.clone().unwrap_or_else(|| self.name.clone()),
            ops,
            state,
        })
    }

    /// Materialize the state by full replay of every operation.
    ///
    /// # Errors
    /// Returns an error if the operations do not replay.
    pub fn replay(&self) -> Result<DatasetState, FoldError> {
        fold::materialize(self.ops.iter().map(|s| &s.op))
    }

    /// Check that this log is owned by `expected_owner`.
    ///
    /// # Errors
    /// Returns [`OplogError::NotOwner`] on mismatch.
    pub fn verify_owner(&self, expected_owner: &AuthorId) -> Result<(), OplogError> {
        if &self.owner == expected_owner {
            Ok(())
        } else {
            Err(OplogError::NotOwner {
                index: 0,
                expected: *expected_owner,
                actual: self.owner,
            })
        }
    }

    // -- accessors --

    /// The stable id of this log.
    #[must_use]
    pub const fn id(&self) -> &OplogId {
        &self.id
    }

    /// The owner's public key.
    #[must_use]
    pub const fn owner(&self) -> &AuthorId {
        &self.owner
    }

    /// The owner's username.
    #[must_use]
    pub const fn username(&self) -> &Username {
        &self.username
    }

    /// Every operation, oldest first.
    #[must_use]
    pub fn ops(&self) -> &[SignedOperation] {
        &self.ops
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Always `false` for a constructed log.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The materialized state at the end of the log.
    #[must_use]
    pub const fn state(&self) -> &DatasetState {
        &self.state
    }

    /// The current dataset name.
    #[must_use]
    pub const fn name(&self) -> &DatasetName {
        &self.name
    }

    /// Timestamp of the newest operation.
    #[must_use]
    pub fn last_timestamp(&self) -> i64 {
        self.state.last_timestamp.unwrap_or(0)
    }

    // -- encoding --

    /// Serialize to canonical JSON bytes.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&OplogDocument {
            id: self.id.clone(),
            owner: self.owner,
            username: self.username.clone(),
            ops: self.ops.clone(),
        })
    }

    /// Decode and verify a log from JSON bytes.
    ///
    /// # Errors
    /// Returns an error if decoding fails or the log does not verify (see
    /// [`Oplog::from_parts`]).
    pub fn from_json(bytes: &[u8]) -> Result<Self, OplogError> {
        let doc: OplogDocument = serde_json::from_slice(bytes)?;
        Self::from_parts(doc.id, doc.owner, doc.username, doc.ops)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
