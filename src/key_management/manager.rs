//! Key manager: active key, bounded history and rotation
//!
//! The manager owns the only shared mutable state in the crate, the pair
//! `(active, history)`, behind a single reader/writer lock. Token operations
//! take the read lock; rotation, initialization and refresh take the write
//! lock and swap the state in one step, so readers never see a torn view.

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use super::record::{KeyRecord, PublicKeySet};
use super::store::KeyStore;
use crate::config::KeyManagerConfig;
use crate::engine::{EncryptOptions, EncryptionEngine};
use crate::error::{error_codes, CryptoError, CryptoResult};

/// What a manager is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerMode {
    /// Generates and rotates keys, issues and validates tokens
    Issuer,
    /// Validates tokens with keys loaded from a store; never writes
    ValidationOnly,
}

#[derive(Default)]
struct KeyState {
    active: Option<KeyRecord>,
    /// Retired keys, newest first
    history: VecDeque<KeyRecord>,
}

impl KeyState {
    fn from_records(records: Vec<KeyRecord>, max_history: Option<usize>) -> Self {
        let mut records = records.into_iter();
        let active = records.next();
        let mut history: VecDeque<KeyRecord> = records.collect();
        if let Some(bound) = max_history {
            history.truncate(bound);
        }
        Self { active, history }
    }

    fn candidates(&self) -> Vec<&KeyRecord> {
        self.active.iter().chain(self.history.iter()).collect()
    }
}

/// Key lifecycle manager, generic over the token engine
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use keyseal::prelude::*;
///
/// let store = Arc::new(InMemoryKeyStore::new());
/// let manager =
///     KeyManager::new_issuer(KeyManagerConfig::default(), store, SymmetricEngine::new()).unwrap();
///
/// let token = manager.encrypt(b"payload", &EncryptOptions::new()).unwrap();
/// assert_eq!(manager.decrypt(&token).unwrap(), b"payload");
/// ```
pub struct KeyManager<E: EncryptionEngine> {
    config: KeyManagerConfig,
    mode: ManagerMode,
    store: Arc<dyn KeyStore>,
    engine: E,
    state: RwLock<KeyState>,
}

impl<E: EncryptionEngine> KeyManager<E> {
    /// Create an issuer with no active key yet; call `initialize` next
    pub fn issuer(config: KeyManagerConfig, store: Arc<dyn KeyStore>, engine: E) -> CryptoResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            mode: ManagerMode::Issuer,
            store,
            engine,
            state: RwLock::new(KeyState::default()),
        })
    }

    /// Create an issuer and initialize it
    pub fn new_issuer(
        config: KeyManagerConfig,
        store: Arc<dyn KeyStore>,
        engine: E,
    ) -> CryptoResult<Self> {
        let manager = Self::issuer(config, store, engine)?;
        manager.initialize()?;
        Ok(manager)
    }

    /// Create a validation-only manager seeded from the store
    ///
    /// Fails with `StoreError` when the store holds no keys.
    pub fn validation_only(
        config: KeyManagerConfig,
        store: Arc<dyn KeyStore>,
        engine: E,
    ) -> CryptoResult<Self> {
        config.validate()?;
        let manager = Self {
            config,
            mode: ManagerMode::ValidationOnly,
            store,
            engine,
            state: RwLock::new(KeyState::default()),
        };

        let records = manager.load_snapshot()?;
        if records.is_empty() {
            return Err(CryptoError::store_error_with_code(
                "validation_only",
                "no keys available",
                error_codes::KEY_STORE_EMPTY,
            ));
        }
        *manager.state.write() = KeyState::from_records(records, manager.config.max_history);

        info!(
            "Validation-only key manager loaded from {} store",
            manager.store.name()
        );
        Ok(manager)
    }

    pub fn mode(&self) -> ManagerMode {
        self.mode
    }

    pub fn config(&self) -> &KeyManagerConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn ensure_issuer(&self, operation: &str) -> CryptoResult<()> {
        match self.mode {
            ManagerMode::Issuer => Ok(()),
            ManagerMode::ValidationOnly => Err(CryptoError::mode_error(operation)),
        }
    }

    /// Read every record from the store and check it fits this engine
    fn load_snapshot(&self) -> CryptoResult<Vec<KeyRecord>> {
        let records = self.store.get_all_keys()?;
        let scheme = self.engine.scheme();
        if let Some(other) = records.iter().find(|r| r.scheme() != scheme) {
            return Err(CryptoError::store_error_with_code(
                "load_keys",
                &format!(
                    "key '{}' is {} but the manager expects {} keys",
                    other.id(),
                    other.scheme(),
                    scheme
                ),
                error_codes::KEY_RECORD_INVALID,
            ));
        }
        Ok(records)
    }

    /// Make sure an active key exists
    ///
    /// Adopts the keys already in the store, or generates and persists a
    /// first key when the store is empty. Calling it again is a no-op, as is
    /// calling it on a validation-only manager.
    pub fn initialize(&self) -> CryptoResult<()> {
        if self.mode == ManagerMode::ValidationOnly {
            return Ok(());
        }

        let mut state = self.state.write();
        if state.active.is_some() {
            return Ok(());
        }

        let records = self.load_snapshot()?;
        if records.is_empty() {
            self.rotate_locked(&mut state)?;
        } else {
            *state = KeyState::from_records(records, self.config.max_history);
            if let Some(active) = &state.active {
                info!(
                    "Adopted active key {} from {} store ({} retained)",
                    active.id(),
                    self.store.name(),
                    state.history.len()
                );
            }
        }
        Ok(())
    }

    /// Generate, persist and activate a new key, demoting the current one
    pub fn rotate_key(&self) -> CryptoResult<()> {
        self.ensure_issuer("rotate_key")?;
        let mut state = self.state.write();
        self.rotate_locked(&mut state)
    }

    /// Rotate only if the active key has expired
    ///
    /// The expiry is checked again under the write lock, so of several
    /// concurrent callers exactly one rotates. Returns whether this call
    /// rotated.
    pub fn rotate_if_needed(&self) -> CryptoResult<bool> {
        self.ensure_issuer("rotate_if_needed")?;
        if !self.must_rotate_now() {
            return Ok(false);
        }

        let mut state = self.state.write();
        let expired = match &state.active {
            None => true,
            Some(active) => active.is_expired_at(Utc::now()),
        };
        if !expired {
            return Ok(false);
        }
        self.rotate_locked(&mut state)?;
        Ok(true)
    }

    fn rotate_locked(&self, state: &mut KeyState) -> CryptoResult<()> {
        let lifetime = chrono::Duration::from_std(self.config.rotation_period).map_err(|_| {
            CryptoError::invalid_parameter(
                "rotation_period",
                "a representable duration",
                &format!("{:?}", self.config.rotation_period),
            )
        })?;

        let record = self.engine.generate_record(lifetime)?;
        // Persist first: a store failure leaves the in-memory state as it was.
        self.store.save_key(&record)?;

        info!(
            "Rotated to key {} (expires {})",
            record.id(),
            record.expires_at().to_rfc3339()
        );

        if let Some(previous) = state.active.replace(record) {
            state.history.push_front(previous);
        }

        if let Some(bound) = self.config.max_history {
            while state.history.len() > bound {
                if let Some(evicted) = state.history.pop_back() {
                    debug!("Evicted retired key {}", evicted.id());
                }
            }
            if let Err(e) = self.store.prune(bound) {
                warn!("Pruning {} store failed: {}", self.store.name(), e);
            }
        }
        Ok(())
    }

    /// Whether the active key has expired; true when there is none
    pub fn must_rotate_now(&self) -> bool {
        match &self.state.read().active {
            None => true,
            Some(active) => active.is_expired_at(Utc::now()),
        }
    }

    pub fn active_key(&self) -> Option<KeyRecord> {
        self.state.read().active.clone()
    }

    /// Retired keys, newest first
    pub fn history(&self) -> Vec<KeyRecord> {
        self.state.read().history.iter().cloned().collect()
    }

    /// Public halves of the active and retained keys
    pub fn public_key_set(&self) -> CryptoResult<PublicKeySet> {
        let state = self.state.read();
        let keys = state
            .candidates()
            .into_iter()
            .map(|record| {
                record
                    .public_key()
                    .ok_or_else(|| CryptoError::unsupported("public_key_set", record.scheme().as_str()))
            })
            .collect::<CryptoResult<Vec<_>>>()?;
        Ok(PublicKeySet { keys })
    }

    /// Reload the key view from the store
    ///
    /// Lets a process pick up rotations made by another instance sharing the
    /// same store. An empty store leaves the current view untouched.
    pub fn refresh(&self) -> CryptoResult<()> {
        // The store is read under the write lock so a rotation in this
        // process cannot land between the read and the swap.
        let mut state = self.state.write();
        let records = self.load_snapshot()?;
        if records.is_empty() {
            return match self.mode {
                ManagerMode::Issuer => Ok(()),
                ManagerMode::ValidationOnly => Err(CryptoError::store_error_with_code(
                    "refresh",
                    "no keys available",
                    error_codes::KEY_STORE_EMPTY,
                )),
            };
        }

        *state = KeyState::from_records(records, self.config.max_history);
        if let Some(active) = &state.active {
            info!("Refreshed keys from {} store, active key {}", self.store.name(), active.id());
        }
        Ok(())
    }

    fn rotate_before_issue(&self) -> CryptoResult<()> {
        if self.config.rotate_on_expiry {
            self.rotate_if_needed()?;
        }
        Ok(())
    }

    fn no_active_key(operation: &str) -> CryptoError {
        CryptoError::store_error_with_code(
            operation,
            "no active key, initialize the manager first",
            error_codes::NO_ACTIVE_KEY,
        )
    }

    fn encrypt_with(
        &self,
        active: &KeyRecord,
        payload: &[u8],
        options: &EncryptOptions,
    ) -> CryptoResult<String> {
        let mut options = options.clone();
        options.cipher.get_or_insert(self.config.content_cipher);

        let token = self.engine.encrypt(payload, active, &options)?;
        debug!("Encrypted {} byte payload with key {}", payload.len(), active.id());
        Ok(token)
    }

    /// Encrypt a payload under the active key
    pub fn encrypt(&self, payload: &[u8], options: &EncryptOptions) -> CryptoResult<String> {
        self.ensure_issuer("encrypt")?;
        self.rotate_before_issue()?;

        let state = self.state.read();
        let active = state.active.as_ref().ok_or_else(|| Self::no_active_key("encrypt"))?;
        self.encrypt_with(active, payload, options)
    }

    /// Sign a payload, then encrypt the signed form
    ///
    /// Both steps use the same active key: rotation is checked once up front
    /// and the read guard is held across signing and encryption.
    pub fn sign_and_encrypt(
        &self,
        payload: &[u8],
        options: &EncryptOptions,
    ) -> CryptoResult<String> {
        self.ensure_issuer("sign_and_encrypt")?;
        self.rotate_before_issue()?;

        let state = self.state.read();
        let active = state
            .active
            .as_ref()
            .ok_or_else(|| Self::no_active_key("sign_and_encrypt"))?;
        let signed = self.engine.sign(payload, active)?;
        self.encrypt_with(active, signed.as_bytes(), options)
    }

    /// Decrypt a token, trying the active key then history newest first
    pub fn decrypt(&self, token: &str) -> CryptoResult<Vec<u8>> {
        let state = self.state.read();
        self.engine.decrypt(token, &state.candidates())
    }

    /// Sign a payload with the active key
    pub fn sign(&self, payload: &[u8]) -> CryptoResult<String> {
        self.ensure_issuer("sign")?;
        self.rotate_before_issue()?;

        let state = self.state.read();
        let active = state.active.as_ref().ok_or_else(|| Self::no_active_key("sign"))?;
        self.engine.sign(payload, active)
    }

    /// Verify a signed token against the active and retained keys
    pub fn verify(&self, token: &str) -> CryptoResult<Vec<u8>> {
        let state = self.state.read();
        self.engine.verify(token, &state.candidates())
    }
}

impl<E: EncryptionEngine> fmt::Debug for KeyManager<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("KeyManager")
            .field("mode", &self.mode)
            .field("scheme", &self.engine.scheme())
            .field("store", &self.store.name())
            .field("active", &state.active.as_ref().map(KeyRecord::id))
            .field("history_len", &state.history.len())
            .finish()
    }
}
