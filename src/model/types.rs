//! Core identifier types for the logbook.
//!
//! Foundation types used throughout the crate: usernames, dataset names,
//! and stable oplog identifiers. Each is a validated newtype that serializes
//! as a plain string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Name rules shared by usernames and dataset names
// ---------------------------------------------------------------------------

fn validate_name(kind: ErrorKind, s: &str, max_len: usize) -> Result<(), ValidationError> {
    let err = |reason: String| ValidationError {
        kind,
        value: s.to_owned(),
        reason,
    };
    if s.is_empty() {
        return Err(err(format!("{kind} must not be empty")));
    }
    if s.len() > max_len {
        return Err(err(format!(
            "{kind} must be at most {max_len} characters, got {}",
            s.len()
        )));
    }
    if !s.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(err(format!("{kind} must start with a letter")));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(err(format!(
            "{kind} must contain only letters, digits, underscores (_), and hyphens (-)"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Username
// ---------------------------------------------------------------------------

/// A validated username (peername) identifying the human-readable owner of
/// a book. Authorization never relies on it; see [`AuthorId`](crate::identity::AuthorId).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// The maximum length of a username.
    pub const MAX_LEN: usize = 64;

    /// Create a new `Username`, validating format.
    ///
    /// # Errors
    /// Returns an error if the name is empty, too long, does not start with a
    /// letter, or contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_name(ErrorKind::Username, s, Self::MAX_LEN)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the username as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Username {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Username {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_name(ErrorKind::Username, &s, Self::MAX_LEN)?;
        Ok(Self(s))
    }
}

impl From<Username> for String {
    fn from(name: Username) -> Self {
        name.0
    }
}

// ---------------------------------------------------------------------------
// DatasetName
// ---------------------------------------------------------------------------

/// A validated dataset name, unique per owning identity.
///
/// Examples: `world_bank_population`, `nyc-311`, `a`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetName(String);

impl DatasetName {
    /// The maximum length of a dataset name.
    pub const MAX_LEN: usize = 144;

    /// Create a new `DatasetName`, validating format.
    ///
    /// # Errors
    /// Returns an error if the name is empty, too long, does not start with a
    /// letter, or contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        validate_name(ErrorKind::DatasetName, s, Self::MAX_LEN)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the dataset name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DatasetName {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DatasetName {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        validate_name(ErrorKind::DatasetName, &s, Self::MAX_LEN)?;
        Ok(Self(s))
    }
}

impl From<DatasetName> for String {
    fn from(name: DatasetName) -> Self {
        name.0
    }
}

// ---------------------------------------------------------------------------
// OplogId
// ---------------------------------------------------------------------------

/// The stable identifier of an oplog: 40 lowercase hex characters.
///
/// Derived once from the signed bytes of the log's Init operation and never
/// changed afterwards, so it survives renames.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OplogId(String);

impl OplogId {
    /// Length of the hex representation.
    pub const LEN: usize = 40;

    /// Create an `OplogId` from a hex string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Derive an id from the canonical bytes of an Init operation.
    #[must_use]
    pub fn derive(init_bytes: &[u8]) -> Self {
        let digest = Sha256::digest(init_bytes);
        Self(hex::encode(&digest[..Self::LEN / 2]))
    }

    /// Return the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A short prefix for log lines and display.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.len() != Self::LEN {
            return Err(ValidationError {
                kind: ErrorKind::OplogId,
                value: s.to_owned(),
                reason: format!("expected {} hex characters, got {}", Self::LEN, s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ValidationError {
                kind: ErrorKind::OplogId,
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for OplogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OplogId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OplogId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<OplogId> for String {
    fn from(id: OplogId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Which kind of value failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A [`Username`].
    Username,
    /// A [`DatasetName`].
    DatasetName,
    /// An [`OplogId`].
    OplogId,
    /// A dataset reference string.
    Reference,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Username => write!(f, "username"),
            Self::DatasetName => write!(f, "dataset name"),
            Self::OplogId => write!(f, "oplog id"),
            Self::Reference => write!(f, "dataset reference"),
        }
    }
}

/// A validation error for logbook identifier types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// What kind of value was being validated.
    pub kind: ErrorKind,
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
