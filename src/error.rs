//! Error type for book operations.
//!
//! [`LogbookError`] is returned by every [`Book`](crate::book::Book) method.
//! Its variants are the failure modes a caller is expected to match on
//! (missing dataset, stale head, wrong key) plus transparent wrappers for
//! the layers underneath.

use logbook_cas::{Address, StoreError};
use thiserror::Error;

use crate::context::ContextError;
use crate::dscache::CacheError;
use crate::model::types::{ErrorKind, ValidationError};
use crate::oplog::persist::PersistError;

/// Errors returned by [`Book`](crate::book::Book) operations.
#[derive(Debug, Error)]
pub enum LogbookError {
    /// No dataset matches the reference.
    #[error("dataset not found: {reference}")]
    NotFound {
        /// The reference that did not resolve.
        reference: String,
    },

    /// `init_dataset` was asked to create a name that is already in use.
    #[error("dataset already exists: {reference}")]
    AlreadyExists {
        /// The reference that is taken.
        reference: String,
    },

    /// A rename target is already in use (or is the current name).
    #[error("name `{name}` is already taken by {username}")]
    NameTaken {
        /// Owner of the colliding dataset.
        username: String,
        /// The contested name.
        name: String,
    },

    /// The caller may not perform this operation.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Which check failed.
        message: String,
    },

    /// A version was saved against a head that is no longer current.
    #[error(
        "conflict on {dataset}: previous path {} does not match head {}",
        display_path(.declared.as_ref()),
        display_path(.head.as_ref())
    )]
    Conflict {
        /// The dataset.
        dataset: String,
        /// The previous path the caller supplied.
        declared: Option<Address>,
        /// The actual head.
        head: Option<Address>,
    },

    /// A delete asked for more versions than exist.
    #[error("cannot delete {requested} versions of {dataset}, only {available} exist")]
    InsufficientHistory {
        /// The dataset.
        dataset: String,
        /// Versions requested.
        requested: u32,
        /// Versions available.
        available: usize,
    },

    /// A log failed signature or ownership verification.
    #[error("invalid signature: {message}")]
    InvalidSignature {
        /// What failed to verify.
        message: String,
    },

    /// A username or dataset name failed validation.
    #[error(transparent)]
    InvalidName(ValidationError),

    /// A dataset reference failed validation.
    #[error(transparent)]
    InvalidRef(ValidationError),

    /// An argument outside its allowed range.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// The operation's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A stored log or index is unreadable or does not replay.
    #[error("corrupt log: {message}")]
    CorruptLog {
        /// What was wrong.
        message: String,
    },

    /// The content store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// JSON encoding failed.
    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The dscache file could not be saved or loaded.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

fn display_path(path: Option<&Address>) -> String {
    path.map_or_else(|| "\"\"".to_owned(), ToString::to_string)
}

impl From<ValidationError> for LogbookError {
    fn from(err: ValidationError) -> Self {
        match err.kind {
            ErrorKind::Reference => Self::InvalidRef(err),
            ErrorKind::Username | ErrorKind::DatasetName | ErrorKind::OplogId => {
                Self::InvalidName(err)
            }
        }
    }
}

impl From<ContextError> for LogbookError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl From<PersistError> for LogbookError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Context(e) => e.into(),
            PersistError::Store(e) => Self::Store(e),
            PersistError::Encoding(e) => Self::Encoding(e),
            PersistError::Invalid { address, source } => Self::CorruptLog {
                message: format!("{address}: {source}"),
            },
        }
    }
}

/// Convenience alias.
pub type Result<T, E = LogbookError> = std::result::Result<T, E>;
