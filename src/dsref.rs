//! Dataset references.
//!
//! A [`DsRef`] names a dataset by `(username, name)` and optionally pins the
//! content address of a version. Its string form is
//! `username/name` or `username/name@path`:
//!
//! ```rust
//! use logbook::dsref::DsRef;
//!
//! let r: DsRef = "b5/movies@Qm1".parse().unwrap();
//! assert_eq!(r.username.as_str(), "b5");
//! assert_eq!(r.name.as_str(), "movies");
//! assert_eq!(r.path.as_ref().map(|p| p.as_str()), Some("Qm1"));
//! assert_eq!(r.to_string(), "b5/movies@Qm1");
//! ```

use std::fmt;
use std::str::FromStr;

use logbook_cas::Address;
use serde::{Deserialize, Serialize};

use crate::model::types::{DatasetName, ErrorKind, Username, ValidationError};

// ---------------------------------------------------------------------------
// DsRef
// ---------------------------------------------------------------------------

/// A reference to a dataset, optionally at a specific version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DsRef {
    /// Owner's username.
    pub username: Username,
    /// Dataset name.
    pub name: DatasetName,
    /// Content address of the head version; `None` for an unresolved
    /// reference or a dataset with no versions.
    pub path: Option<Address>,
}

impl DsRef {
    /// A reference without a path.
    #[must_use]
    pub const fn new(username: Username, name: DatasetName) -> Self {
        Self {
            username,
            name,
            path: None,
        }
    }

    /// The same reference pinned to `path`.
    #[must_use]
    pub fn with_path(mut self, path: Option<Address>) -> Self {
        self.path = path;
        self
    }

    /// The `username/name` part, without the path.
    #[must_use]
    pub fn alias(&self) -> String {
        format!("{}/{}", self.username, self.name)
    }
}

impl fmt::Display for DsRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.username, self.name)?;
        if let Some(path) = &self.path {
            write!(f, "@{path}")?;
        }
        Ok(())
    }
}

impl FromStr for DsRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError {
            kind: ErrorKind::Reference,
            value: s.to_owned(),
            reason: reason.to_owned(),
        };

        let (alias, path) = match s.split_once('@') {
            Some((alias, path)) => (alias, Some(path)),
            None => (s, None),
        };
        let (user, name) = alias
            .split_once('/')
            .ok_or_else(|| invalid("expected username/name"))?;

        let username = Username::new(user).map_err(|e| invalid(&e.to_string()))?;
        let name = DatasetName::new(name).map_err(|e| invalid(&e.to_string()))?;
        let path = path
            .map(|p| Address::new(p).map_err(|e| invalid(&e.to_string())))
            .transpose()?;

        Ok(Self {
            username,
            name,
            path,
        })
    }
}

// ---------------------------------------------------------------------------
// VersionSave
// ---------------------------------------------------------------------------

/// Input to [`Book::save_version`](crate::book::Book::save_version): a new
/// version of an existing dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSave {
    /// Owner of the dataset.
    pub username: Username,
    /// Dataset name.
    pub name: DatasetName,
    /// Head the caller built on; `None` for the first version.
    pub previous_path: Option<Address>,
    /// Content address of the new version.
    pub path: Address,
    /// Commit title.
    pub title: String,
}

impl VersionSave {
    /// A version of the dataset `base` points at, building on `base.path`.
    #[must_use]
    pub fn on(base: &DsRef, path: Address, title: impl Into<String>) -> Self {
        Self {
            username: base.username.clone(),
            name: base.name.clone(),
            previous_path: base.path.clone(),
            path,
            title: title.into(),
        }
    }

    /// The dataset this version belongs to, without a path.
    #[must_use]
    pub fn dataset(&self) -> DsRef {
        DsRef::new(self.username.clone(), self.name.clone())
    }
}

// ---------------------------------------------------------------------------
// VersionInfo
// ---------------------------------------------------------------------------

/// One version of a dataset as reported by
/// [`Book::versions`](crate::book::Book::versions).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// The dataset, pinned to this version.
    pub dsref: DsRef,
    /// Commit title.
    pub title: String,
    /// Timestamp of the save, in nanoseconds.
    pub timestamp: i64,
}
