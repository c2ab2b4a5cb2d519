//! The book's root index: the single mutable record of which log blob is
//! current for every dataset.
//!
//! The index is stored as a content-addressed blob and referenced from the
//! root pointer `logbook/<username>`. Every committed mutation writes a new
//! index blob and moves the pointer with compare-and-swap, so a rename's
//! name change and its new log land in one atomic step.
//!
//! ```text
//! {"owner":"<hex key>","username":"b5",
//!  "datasets":{"movies":{"id":"…","log":"/sha256/…"}},
//!  "foreign":{"<id>":"/sha256/…"}}
//! ```

use std::collections::BTreeMap;

use logbook_cas::{Address, AddressError, RootName};
use serde::{Deserialize, Serialize};

use crate::identity::{Author, AuthorId};
use crate::model::types::{DatasetName, OplogId, Username};

/// Namespace of book root pointers.
pub const ROOT_PREFIX: &str = "logbook";

/// The root pointer for `username`'s book.
///
/// Root names are lowercase, so usernames differing only by case share a
/// pointer; the index records its owner key, which [`Book::open`] checks.
///
/// [`Book::open`]: crate::book::Book::open
///
/// # Errors
/// Returns an error if the username cannot form a root name.
pub fn root_name(username: &Username) -> Result<RootName, AddressError> {
    RootName::new(&format!(
        "{ROOT_PREFIX}/{}",
        username.as_str().to_ascii_lowercase()
    ))
}

/// Where a local dataset's current log lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Stable id of the dataset's oplog.
    pub id: OplogId,
    /// Address of the current log blob.
    pub log: Address,
}

/// The decoded root index of one book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookIndex {
    /// Key of the identity that owns the book.
    pub owner: AuthorId,
    /// Username of that identity.
    pub username: Username,
    /// Local datasets by current name.
    #[serde(default)]
    pub datasets: BTreeMap<DatasetName, IndexEntry>,
    /// Imported foreign logs by id.
    #[serde(default)]
    pub foreign: BTreeMap<OplogId, Address>,
}

impl BookIndex {
    /// An empty index for `author`.
    #[must_use]
    pub fn new(author: &Author) -> Self {
        Self {
            owner: author.id(),
            username: author.username().clone(),
            datasets: BTreeMap::new(),
            foreign: BTreeMap::new(),
        }
    }

    /// The id registered under `name`.
    #[must_use]
    pub fn id_for(&self, name: &DatasetName) -> Option<&OplogId> {
        self.datasets.get(name).map(|e| &e.id)
    }

    /// The name a local id is registered under.
    #[must_use]
    pub fn name_for(&self, id: &OplogId) -> Option<&DatasetName> {
        self.datasets
            .iter()
            .find_map(|(name, entry)| (&entry.id == id).then_some(name))
    }

    /// Point `name` at `log`, removing any other name held by `id`.
    pub fn set_local(&mut self, name: DatasetName, id: OplogId, log: Address) {
        self.datasets.retain(|n, e| e.id != id || n == &name);
        self.datasets.insert(name, IndexEntry { id, log });
    }

    /// Record the current blob of a foreign log.
    pub fn set_foreign(&mut self, id: OplogId, log: Address) {
        self.foreign.insert(id, log);
    }

    /// Serialize to canonical JSON bytes.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid index.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
