//! Identities, keys, and signatures.
//!
//! An [`Author`] holds an ed25519 signing key and acts for exactly one
//! username. Everyone else is known only by their public key, an
//! [`AuthorId`], which is what authorization and signature checks compare.
//! Usernames are labels; keys are authority.
//!
//! The [`KeyProvider`] trait is the seam through which a book obtains its
//! local signer and looks up the public keys of remote authors.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::types::Username;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors decoding keys and signatures.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The input was not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The decoded bytes had the wrong length.
    #[error("expected {expected} bytes, got {actual}")]
    Length {
        /// Required byte length.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// The bytes are not a valid ed25519 public key.
    #[error("invalid public key: {0}")]
    PublicKey(#[from] SignatureError),
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], KeyError> {
    let bytes = hex::decode(s.trim())?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| KeyError::Length {
        expected: N,
        actual,
    })
}

// ---------------------------------------------------------------------------
// Author
// ---------------------------------------------------------------------------

/// A local identity: a username plus the private key that signs for it.
#[derive(Clone)]
pub struct Author {
    username: Username,
    signing_key: SigningKey,
}

impl Author {
    /// Create an author with a freshly generated key.
    #[must_use]
    pub fn generate(username: Username) -> Self {
        Self::from_bytes(username, &rand::random::<[u8; 32]>())
    }

    /// Create an author from raw secret key bytes.
    #[must_use]
    pub fn from_bytes(username: Username, secret: &[u8; 32]) -> Self {
        Self {
            username,
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Create an author from a hex-encoded secret key.
    ///
    /// # Errors
    /// Returns an error if `secret_hex` is not 32 bytes of hex.
    pub fn from_hex(username: Username, secret_hex: &str) -> Result<Self, KeyError> {
        Ok(Self::from_bytes(username, &decode_fixed::<32>(secret_hex)?))
    }

    /// Hex-encode the secret key, for writing a key file.
    #[must_use]
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// The username this author acts for.
    #[must_use]
    pub const fn username(&self) -> &Username {
        &self.username
    }

    /// The public identity of this author.
    #[must_use]
    pub fn id(&self) -> AuthorId {
        AuthorId(self.signing_key.verifying_key())
    }

    /// Sign a message with this author's key.
    #[must_use]
    pub fn sign(&self, msg: &[u8]) -> OpSignature {
        OpSignature(self.signing_key.sign(msg))
    }
}

impl fmt::Debug for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Author")
            .field("username", &self.username)
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// AuthorId
// ---------------------------------------------------------------------------

/// The public key of an author; serializes as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuthorId(VerifyingKey);

impl AuthorId {
    /// Strictly verify `signature` over `msg` against this key.
    ///
    /// # Errors
    /// Returns an error if the signature was not produced by this key's
    /// private half over exactly these bytes.
    pub fn verify(&self, msg: &[u8], signature: &OpSignature) -> Result<(), SignatureError> {
        self.0.verify_strict(msg, &signature.0)
    }

    /// The raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// A short prefix for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..6])
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.as_bytes()))
    }
}

impl fmt::Debug for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorId({})", self.short())
    }
}

impl FromStr for AuthorId {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(VerifyingKey::from_bytes(&decode_fixed::<32>(s)?)?))
    }
}

impl TryFrom<String> for AuthorId {
    type Error = KeyError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AuthorId> for String {
    fn from(id: AuthorId) -> Self {
        id.to_string()
    }
}

// ---------------------------------------------------------------------------
// OpSignature
// ---------------------------------------------------------------------------

/// An ed25519 signature; serializes as 128 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OpSignature(Signature);

impl fmt::Display for OpSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_bytes()))
    }
}

impl fmt::Debug for OpSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpSignature({}…)", &self.to_string()[..12])
    }
}

impl FromStr for OpSignature {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Signature::from_bytes(&decode_fixed::<64>(s)?)))
    }
}

impl TryFrom<String> for OpSignature {
    type Error = KeyError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<OpSignature> for String {
    fn from(sig: OpSignature) -> Self {
        sig.to_string()
    }
}

// ---------------------------------------------------------------------------
// KeyProvider
// ---------------------------------------------------------------------------

/// Source of the local signing identity and of remote authors' public keys.
pub trait KeyProvider: Send + Sync {
    /// The identity this process signs as.
    fn local(&self) -> &Author;

    /// Look up the public key registered for `username`, if any.
    fn public_key(&self, username: &Username) -> Option<AuthorId>;
}

/// An in-process [`KeyProvider`]: one local author plus a table of known
/// remote public keys.
#[derive(Debug)]
pub struct Keyring {
    local: Author,
    known: RwLock<HashMap<Username, AuthorId>>,
}

impl Keyring {
    /// Create a keyring for `local` with no remote keys.
    #[must_use]
    pub fn new(local: Author) -> Self {
        Self {
            local,
            known: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) the public key of a remote author.
    pub fn insert(&self, username: Username, id: AuthorId) {
        self.known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(username, id);
    }
}

impl KeyProvider for Keyring {
    fn local(&self) -> &Author {
        &self.local
    }

    fn public_key(&self, username: &Username) -> Option<AuthorId> {
        if username == self.local.username() {
            return Some(self.local.id());
        }
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username)
            .copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
