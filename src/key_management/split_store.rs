//! Key stores that keep the active key apart from retired ones
//!
//! Some backends hold a single "active" slot plus a list of previous keys
//! rather than an append-only log. `SplitStoreAdapter` lets such a backend
//! serve as a regular `KeyStore`.

use parking_lot::{Mutex, RwLock};

use super::record::{KeyRecord, StoredKey};
use super::store::KeyStore;
use crate::error::CryptoResult;

/// Backend with an active slot and a list of previous keys
///
/// Previous keys are kept newest first.
pub trait SplitKeyStore: Send + Sync {
    fn save_active_key(&self, record: &KeyRecord) -> CryptoResult<()>;

    /// Add a retired key in front of the previous keys
    fn save_previous_key(&self, record: &KeyRecord) -> CryptoResult<()>;

    fn get_active_key(&self) -> CryptoResult<Option<KeyRecord>>;

    fn get_previous_keys(&self) -> CryptoResult<Vec<KeyRecord>>;

    /// Replace the previous keys wholesale, used for pruning
    fn set_previous_keys(&self, records: &[KeyRecord]) -> CryptoResult<()>;

    fn name(&self) -> &'static str;
}

/// Volatile split store
#[derive(Default)]
pub struct InMemorySplitStore {
    active: RwLock<Option<StoredKey>>,
    previous: RwLock<Vec<StoredKey>>,
}

impl InMemorySplitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SplitKeyStore for InMemorySplitStore {
    fn save_active_key(&self, record: &KeyRecord) -> CryptoResult<()> {
        *self.active.write() = Some(record.to_stored());
        Ok(())
    }

    fn save_previous_key(&self, record: &KeyRecord) -> CryptoResult<()> {
        self.previous.write().insert(0, record.to_stored());
        Ok(())
    }

    fn get_active_key(&self) -> CryptoResult<Option<KeyRecord>> {
        self.active
            .read()
            .as_ref()
            .map(KeyRecord::from_stored)
            .transpose()
    }

    fn get_previous_keys(&self) -> CryptoResult<Vec<KeyRecord>> {
        self.previous
            .read()
            .iter()
            .map(KeyRecord::from_stored)
            .collect()
    }

    fn set_previous_keys(&self, records: &[KeyRecord]) -> CryptoResult<()> {
        *self.previous.write() = records.iter().map(KeyRecord::to_stored).collect();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory-split"
    }
}

/// Presents a `SplitKeyStore` as a `KeyStore`
///
/// Saving a key moves the current active key to the previous list first.
/// The sequence runs under a mutex so concurrent saves cannot interleave.
pub struct SplitStoreAdapter<S> {
    inner: S,
    write_guard: Mutex<()>,
}

impl<S: SplitKeyStore> SplitStoreAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            write_guard: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: SplitKeyStore> KeyStore for SplitStoreAdapter<S> {
    fn save_key(&self, record: &KeyRecord) -> CryptoResult<()> {
        let _guard = self.write_guard.lock();
        if let Some(current) = self.inner.get_active_key()? {
            if current.id() != record.id() {
                self.inner.save_previous_key(&current)?;
            }
        }
        self.inner.save_active_key(record)
    }

    fn get_all_keys(&self) -> CryptoResult<Vec<KeyRecord>> {
        let mut records = Vec::new();
        if let Some(active) = self.inner.get_active_key()? {
            records.push(active);
        }
        records.extend(self.inner.get_previous_keys()?);
        Ok(records)
    }

    fn prune(&self, keep_history: usize) -> CryptoResult<()> {
        let _guard = self.write_guard.lock();
        let previous = self.inner.get_previous_keys()?;
        if previous.len() > keep_history {
            self.inner.set_previous_keys(&previous[..keep_history])?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
