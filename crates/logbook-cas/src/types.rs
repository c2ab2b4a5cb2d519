//! Core types for the content-addressed store.
//!
//! These types form the vocabulary shared between the
//! [`ContentStore`](crate::ContentStore) trait and the logbook. They carry no
//! backend-specific representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A content address: an opaque, validated identifier for stored bytes.
///
/// Addresses minted by the stores in this crate have the form
/// `/sha256/<64 lowercase hex>`. Addresses minted elsewhere (for instance an
/// IPFS path recorded as a dataset version) are accepted as long as they are
/// non-empty, at most [`Address::MAX_LEN`] bytes, and free of whitespace and
/// control characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// The maximum length of an address string.
    pub const MAX_LEN: usize = 512;

    /// Prefix of addresses minted by [`Address::for_bytes`].
    pub const SHA256_PREFIX: &'static str = "/sha256/";

    /// Create a new `Address` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is empty, too long, or contains
    /// whitespace or control characters.
    pub fn new(s: &str) -> Result<Self, AddressError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Compute the sha256 content address of `bytes`.
    #[must_use]
    pub fn for_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("{}{}", Self::SHA256_PREFIX, hex::encode(digest)))
    }

    /// Return the address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the hex digest if this is a sha256 address minted by this crate.
    #[must_use]
    pub fn sha256_hex(&self) -> Option<&str> {
        let hex = self.0.strip_prefix(Self::SHA256_PREFIX)?;
        (hex.len() == 64
            && hex
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()))
        .then_some(hex)
    }

    fn validate(s: &str) -> Result<(), AddressError> {
        if s.is_empty() {
            return Err(AddressError::new(s, "address must not be empty"));
        }
        if s.len() > Self::MAX_LEN {
            return Err(AddressError::new(
                s,
                format!(
                    "address must be at most {} bytes, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            ));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(AddressError::new(
                s,
                "address must not contain whitespace or control characters",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

// ---------------------------------------------------------------------------
// RootName
// ---------------------------------------------------------------------------

/// The name of a mutable root pointer, e.g. `logbook/b5`.
///
/// One or more `/`-separated segments of `[a-z0-9._-]`; segments may not be
/// empty, `.` or `..`. The name maps directly onto a relative file path in
/// [`FsStore`](crate::FsStore), so the rules keep it inside the store root.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RootName(String);

impl RootName {
    /// Create a new `RootName`, validating format.
    ///
    /// # Errors
    /// Returns an error if any segment is empty, a dot segment, or contains a
    /// character outside `[a-z0-9._-]`.
    pub fn new(s: &str) -> Result<Self, AddressError> {
        if s.is_empty() {
            return Err(AddressError::new(s, "root name must not be empty"));
        }
        for segment in s.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(AddressError::new(
                    s,
                    format!("invalid root name segment {segment:?}"),
                ));
            }
            if !segment.chars().all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
            }) {
                return Err(AddressError::new(
                    s,
                    "root name segments may only contain a-z, 0-9, '.', '_' and '-'",
                ));
            }
        }
        Ok(Self(s.to_owned()))
    }

    /// Return the root name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the `/`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for RootName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RootName {
    type Err = AddressError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// AddressError
// ---------------------------------------------------------------------------

/// Error from validating an [`Address`] or [`RootName`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl AddressError {
    fn new(value: &str, reason: impl Into<String>) -> Self {
        Self {
            value: value.to_owned(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for AddressError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
