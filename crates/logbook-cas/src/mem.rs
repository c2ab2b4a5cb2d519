//! In-memory [`ContentStore`] backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::StoreError;
use crate::store::ContentStore;
use crate::types::{Address, RootName};

/// A [`ContentStore`] that keeps everything in process memory.
///
/// Cloning a `MemStore` yields a handle to the same underlying maps, which
/// lets tests reopen a book against the "same" store.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    objects: Arc<RwLock<HashMap<Address, Arc<[u8]>>>>,
    roots: Arc<Mutex<HashMap<RootName, Address>>>,
}

impl MemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.read().map_or(0, |objects| objects.len())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend {
        message: "memory store lock poisoned".to_owned(),
    }
}

impl ContentStore for MemStore {
    fn get(&self, address: &Address) -> Result<Vec<u8>, StoreError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .get(address)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| StoreError::NotFound {
                address: address.clone(),
            })
    }

    fn put(&self, bytes: &[u8]) -> Result<Address, StoreError> {
        let address = Address::for_bytes(bytes);
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects
            .entry(address.clone())
            .or_insert_with(|| Arc::from(bytes));
        Ok(address)
    }

    fn has(&self, address: &Address) -> Result<bool, StoreError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects.contains_key(address))
    }

    fn read_root(&self, root: &RootName) -> Result<Option<Address>, StoreError> {
        let roots = self.roots.lock().map_err(|_| poisoned())?;
        Ok(roots.get(root).cloned())
    }

    fn swap_root(
        &self,
        root: &RootName,
        expected: Option<&Address>,
        new: &Address,
    ) -> Result<(), StoreError> {
        let mut roots = self.roots.lock().map_err(|_| poisoned())?;
        let actual = roots.get(root);
        if actual != expected {
            return Err(StoreError::RootConflict {
                root: root.clone(),
                expected: expected.cloned(),
                actual: actual.cloned(),
            });
        }
        roots.insert(root.clone(), new.clone());
        Ok(())
    }
}
