//! Filesystem-backed [`ContentStore`].
//!
//! # Layout
//!
//! ```text
//! <root>/objects/<hex[0..2]>/<hex[2..]>   ← immutable blobs, sha256-addressed
//! <root>/roots/<root name segments>       ← address text of each root pointer
//! ```
//!
//! Every write goes through a temporary file in the destination directory,
//! is fsynced, and is then renamed into place, so a crash never leaves a
//! half-written object or root behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::error::StoreError;
use crate::store::ContentStore;
use crate::types::{Address, RootName};

/// A [`ContentStore`] persisting objects and roots under a directory.
///
/// Root swaps are serialized within the process. Cross-process writers are
/// not coordinated.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    roots_lock: Mutex<()>,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    /// Returns an I/O error if the directory layout cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("roots"))?;
        debug!(root = %root.display(), "opened filesystem store");
        Ok(Self {
            root,
            roots_lock: Mutex::new(()),
        })
    }

    /// The directory this store lives in.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, address: &Address) -> Option<PathBuf> {
        let hex = address.sha256_hex()?;
        Some(self.root.join("objects").join(&hex[..2]).join(&hex[2..]))
    }

    fn root_path(&self, root: &RootName) -> PathBuf {
        root.segments()
            .fold(self.root.join("roots"), |path, segment| path.join(segment))
    }
}

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// fsync, rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().ok_or_else(|| StoreError::Backend {
        message: format!("no parent directory for {}", path.display()),
    })?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

impl ContentStore for FsStore {
    fn get(&self, address: &Address) -> Result<Vec<u8>, StoreError> {
        let not_found = || StoreError::NotFound {
            address: address.clone(),
        };
        let path = self.object_path(address).ok_or_else(not_found)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let digest = hex::encode(Sha256::digest(&bytes));
        if address.sha256_hex() != Some(digest.as_str()) {
            return Err(StoreError::Corrupt {
                address: address.clone(),
            });
        }
        Ok(bytes)
    }

    fn put(&self, bytes: &[u8]) -> Result<Address, StoreError> {
        let address = Address::for_bytes(bytes);
        let path = self.object_path(&address).ok_or_else(|| StoreError::Backend {
            message: format!("minted non-sha256 address {address}"),
        })?;
        if path.exists() {
            trace!(%address, "object already stored");
            return Ok(address);
        }
        write_atomic(&path, bytes)?;
        trace!(%address, len = bytes.len(), "stored object");
        Ok(address)
    }

    fn has(&self, address: &Address) -> Result<bool, StoreError> {
        Ok(self.object_path(address).is_some_and(|p| p.is_file()))
    }

    fn read_root(&self, root: &RootName) -> Result<Option<Address>, StoreError> {
        match fs::read_to_string(self.root_path(root)) {
            Ok(text) => Ok(Some(Address::new(text.trim())?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn swap_root(
        &self,
        root: &RootName,
        expected: Option<&Address>,
        new: &Address,
    ) -> Result<(), StoreError> {
        let _guard = self.roots_lock.lock().map_err(|_| StoreError::Backend {
            message: "filesystem store root lock poisoned".to_owned(),
        })?;
        let actual = self.read_root(root)?;
        if actual.as_ref() != expected {
            return Err(StoreError::RootConflict {
                root: root.clone(),
                expected: expected.cloned(),
                actual,
            });
        }
        write_atomic(&self.root_path(root), format!("{new}\n").as_bytes())?;
        debug!(%root, %new, "swapped root");
        Ok(())
    }
}
