//! Operation struct and OpPayload enum: canonical JSON for signing and
//! content addressing.
//!
//! Operations are the unit of a dataset's oplog. Each records one lifecycle
//! event (init, rename, version save, version delete) with enough data to
//! replay state from scratch.
//!
//! Canonical JSON rules:
//! - Struct fields serialize in declaration order; payload variants carry a
//!   `"type"` tag.
//! - No whitespace.
//! - Deterministic: serialize twice → identical bytes. Signatures are taken
//!   over exactly these bytes.

use logbook_cas::Address;
use serde::{Deserialize, Serialize};

use crate::identity::{AuthorId, OpSignature};
use crate::model::types::DatasetName;

/// Domain prefix mixed into every signed message.
pub const SIGNING_CONTEXT: &[u8] = b"logbook/op/v1\n";

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A single unsigned operation in a dataset's oplog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Nanosecond logical timestamp; strictly increasing within one log.
    pub timestamp: i64,

    /// Public key of the author that issued this operation.
    pub author: AuthorId,

    /// The mutation this operation represents.
    pub payload: OpPayload,
}

// ---------------------------------------------------------------------------
// OpPayload
// ---------------------------------------------------------------------------

/// The kind of mutation recorded by an [`Operation`].
///
/// Serialized with a `"type"` tag: `{"type":"init","name":"…"}` etc.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpPayload {
    /// Dataset created under `name`. Always and only the first operation.
    Init {
        /// Initial dataset name.
        name: DatasetName,
    },

    /// Dataset renamed. History and id are untouched.
    Rename {
        /// The new name.
        name: DatasetName,
    },

    /// A new version committed on top of `previous_path`.
    VersionSave {
        /// Head the author saw when committing; `None` for the first version.
        previous_path: Option<Address>,
        /// Content address of the new version.
        path: Address,
        /// Commit title.
        title: String,
    },

    /// The `count` most recent versions dropped from the head.
    VersionDelete {
        /// Number of versions removed.
        count: u32,
    },
}

impl OpPayload {
    /// Short lowercase name of the variant, used in logs and events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Rename { .. } => "rename",
            Self::VersionSave { .. } => "version_save",
            Self::VersionDelete { .. } => "version_delete",
        }
    }
}

impl Operation {
    /// Serialize this operation to canonical JSON bytes.
    ///
    /// # Errors
    /// Returns an error if serialization fails (shouldn't happen for valid ops).
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// The exact bytes an author signs for this operation.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut msg = SIGNING_CONTEXT.to_vec();
        msg.extend(self.to_canonical_json()?);
        Ok(msg)
    }

    /// Deserialize an operation from JSON bytes.
    ///
    /// # Errors
    /// Returns an error if the bytes are not valid JSON or don't match the schema.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ---------------------------------------------------------------------------
// SignedOperation
// ---------------------------------------------------------------------------

/// An [`Operation`] together with its author's signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    /// The signed operation.
    pub op: Operation,
    /// Signature by `op.author` over [`Operation::signing_bytes`].
    pub signature: OpSignature,
}

impl SignedOperation {
    /// Check the signature against the operation's declared author.
    ///
    /// Whether that author is *allowed* to write the log is a separate check
    /// made by the oplog.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.op
            .signing_bytes()
            .is_ok_and(|msg| self.op.author.verify(&msg, &self.signature).is_ok())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
