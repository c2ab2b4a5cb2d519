//! Dataset state materialization by folding an oplog.
//!
//! A [`DatasetState`] is the read-side interpretation of a dataset's oplog.
//! It is produced either by replaying every operation from the empty state
//! ([`materialize`]) or by folding one new operation onto a previously
//! materialized state ([`apply`]). Both paths run the same step function, so
//! they always agree.
//!
//! # Replay semantics
//!
//! | Payload | Effect on state |
//! |---------|-----------------|
//! | `Init` | Set name, empty version stack (first op only) |
//! | `Rename` | Overwrite name |
//! | `VersionSave` | Check `previous_path == head`, push version |
//! | `VersionDelete(n)` | Check depth ≥ n, pop n versions |
//!
//! Every operation must carry a timestamp strictly greater than the one
//! before it.

use std::fmt;

use logbook_cas::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::types::DatasetName;
use crate::oplog::types::{OpPayload, Operation};

// ---------------------------------------------------------------------------
// DatasetState
// ---------------------------------------------------------------------------

/// One entry on a dataset's version stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Timestamp of the VersionSave operation that created this version.
    pub timestamp: i64,
    /// Content address of the version.
    pub path: Address,
    /// Commit title.
    pub title: String,
}

/// The materialized state of a dataset at the end of its oplog.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetState {
    /// Current name (`None` until the Init operation has been folded).
    pub name: Option<DatasetName>,

    /// Version stack, oldest first; the last entry is the head.
    pub versions: Vec<VersionEntry>,

    /// Number of operations folded to produce this state.
    pub op_count: usize,

    /// Timestamp of the last folded operation.
    pub last_timestamp: Option<i64>,
}

impl DatasetState {
    /// The state before any operation.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            name: None,
            versions: Vec::new(),
            op_count: 0,
            last_timestamp: None,
        }
    }

    /// Content address of the head version, if any.
    #[must_use]
    pub fn head(&self) -> Option<&Address> {
        self.versions.last().map(|v| &v.path)
    }

    /// Depth of the version stack.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// `true` once an Init operation has been folded.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.name.is_some()
    }
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "dataset({name}")?,
            None => write!(f, "dataset(<uninitialized>")?,
        }
        match self.head() {
            Some(head) => write!(f, ", head={head}")?,
            None => write!(f, ", no versions")?,
        }
        write!(f, ", {} versions, {} ops)", self.versions.len(), self.op_count)
    }
}

// ---------------------------------------------------------------------------
// Fold errors
// ---------------------------------------------------------------------------

/// Reasons an operation cannot be folded onto a state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FoldError {
    /// The first operation of a log was not Init.
    #[error("log must begin with an init operation, found {found}")]
    MissingInit {
        /// Kind of the offending operation.
        found: &'static str,
    },

    /// An Init operation appeared after the first position.
    #[error("init operation is only valid as the first operation")]
    DuplicateInit,

    /// Timestamps did not strictly increase.
    #[error("operation timestamp {timestamp} is not after previous {previous}")]
    OutOfOrder {
        /// Timestamp of the previous operation.
        previous: i64,
        /// Timestamp of the rejected operation.
        timestamp: i64,
    },

    /// A VersionSave was built on a head that is no longer current.
    #[error("previous path {} does not match head {}", show(.declared.as_ref()), show(.head.as_ref()))]
    Conflict {
        /// The previous path the operation declared.
        declared: Option<Address>,
        /// The actual head at fold time.
        head: Option<Address>,
    },

    /// A VersionDelete asked for more versions than exist.
    #[error("cannot delete {requested} versions, only {available} available")]
    InsufficientHistory {
        /// Versions the operation asked to delete.
        requested: u32,
        /// Versions on the stack.
        available: usize,
    },

    /// A VersionDelete with a count of zero.
    #[error("delete count must be at least 1")]
    ZeroDelete,
}

fn show(addr: Option<&Address>) -> String {
    addr.map_or_else(|| "\"\"".to_owned(), ToString::to_string)
}

// ---------------------------------------------------------------------------
// Fold engine
// ---------------------------------------------------------------------------

/// Fold a single operation onto `state` in place.
///
/// All checks run before any field is written, so on error `state` is
/// exactly as it was.
///
/// # Errors
/// Returns a [`FoldError`] if the operation is not legal in `state`.
pub fn apply_operation(state: &mut DatasetState, op: &Operation) -> Result<(), FoldError> {
    if let Some(previous) = state.last_timestamp
        && op.timestamp <= previous
    {
        return Err(FoldError::OutOfOrder {
            previous,
            timestamp: op.timestamp,
        });
    }

    match (&op.payload, state.is_initialized()) {
        (OpPayload::Init { name }, false) => {
            state.name = Some(name.clone());
            state.versions.clear();
        }
        (OpPayload::Init { .. }, true) => return Err(FoldError::DuplicateInit),
        (payload, false) => {
            return Err(FoldError::MissingInit {
                found: payload.kind(),
            });
        }

        (OpPayload::Rename { name }, true) => {
            state.name = Some(name.clone());
        }

        (
            OpPayload::VersionSave {
                previous_path,
                path,
                title,
            },
            true,
        ) => {
            if previous_path.as_ref() != state.head() {
                return Err(FoldError::Conflict {
                    declared: previous_path.clone(),
                    head: state.head().cloned(),
                });
            }
            state.versions.push(VersionEntry {
                timestamp: op.timestamp,
                path: path.clone(),
                title: title.clone(),
            });
        }

        (OpPayload::VersionDelete { count }, true) => {
            let n = usize::try_from(*count).unwrap_or(usize::MAX);
            if n == 0 {
                return Err(FoldError::ZeroDelete);
            }
            if n > state.versions.len() {
                return Err(FoldError::InsufficientHistory {
                    requested: *count,
                    available: state.versions.len(),
                });
            }
            state.versions.truncate(state.versions.len() - n);
        }
    }

    state.op_count += 1;
    state.last_timestamp = Some(op.timestamp);
    Ok(())
}

/// Incremental mode: fold `op` onto a copy of `state` and return the result.
///
/// The input state is never modified, so a caller can hold on to it until
/// the new state has been made durable.
///
/// # Errors
/// Returns a [`FoldError`] if the operation is not legal in `state`.
pub fn apply(state: &DatasetState, op: &Operation) -> Result<DatasetState, FoldError> {
    let mut next = state.clone();
    apply_operation(&mut next, op)?;
    Ok(next)
}

/// Full replay: fold every operation, in order, from the empty state.
///
/// # Errors
/// Returns the first [`FoldError`] encountered.
pub fn materialize<'a, I>(ops: I) -> Result<DatasetState, FoldError>
where
    I: IntoIterator<Item = &'a Operation>,
{
    let mut state = DatasetState::empty();
    for op in ops {
        apply_operation(&mut state, op)?;
    }
    Ok(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
