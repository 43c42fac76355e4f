//! Key store abstraction and the in-memory adapter

use parking_lot::RwLock;

use super::record::{KeyRecord, StoredKey};
use crate::error::{CryptoError, CryptoResult};

/// Persistence backend for key records
///
/// Implementations must be safe for concurrent calls. `save_key` appends and
/// must be durable before it returns. `get_all_keys` returns every record
/// still kept, newest first; the first record is the current key.
pub trait KeyStore: Send + Sync {
    /// Append a record
    fn save_key(&self, record: &KeyRecord) -> CryptoResult<()>;

    /// All kept records, newest first
    fn get_all_keys(&self) -> CryptoResult<Vec<KeyRecord>>;

    /// Drop all but the newest record and the `keep_history` records after it
    ///
    /// The default keeps an append-only log.
    fn prune(&self, keep_history: usize) -> CryptoResult<()> {
        let _ = keep_history;
        Ok(())
    }

    /// Short name used in error context and logs
    fn name(&self) -> &'static str;
}

/// Volatile key store for tests and single-process deployments
///
/// Records are held in their persistence form and rebuilt on every read, so
/// callers always receive independent copies.
#[derive(Default)]
pub struct InMemoryKeyStore {
    records: RwLock<Vec<StoredKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently kept
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl KeyStore for InMemoryKeyStore {
    fn save_key(&self, record: &KeyRecord) -> CryptoResult<()> {
        let stored = record.to_stored();
        let mut records = self.records.write();
        if records.iter().any(|existing| existing.id == stored.id) {
            return Err(CryptoError::store_error(
                "save_key",
                &format!("key '{}' already stored", stored.id),
                self.name(),
            ));
        }
        records.push(stored);
        Ok(())
    }

    fn get_all_keys(&self) -> CryptoResult<Vec<KeyRecord>> {
        self.records
            .read()
            .iter()
            .rev()
            .map(KeyRecord::from_stored)
            .collect()
    }

    fn prune(&self, keep_history: usize) -> CryptoResult<()> {
        let mut records = self.records.write();
        let keep = keep_history.saturating_add(1);
        if records.len() > keep {
            let surplus = records.len() - keep;
            records.drain(..surplus);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
