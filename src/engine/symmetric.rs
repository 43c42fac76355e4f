//! Derived-key symmetric engine
//!
//! Each token gets its own content key:
//! `HKDF-SHA256(ikm = master secret, salt = random 32 bytes, info = kid)`.
//! The salt travels in the header, so any holder of the master secret can
//! re-derive the key while the master secret itself never encrypts data.

use chrono::{Duration, Utc};
use hkdf::Hkdf;
use serde_json::Value;
use sha2::Sha256;

use super::envelope::{self, Envelope};
use super::{EncryptOptions, EncryptionEngine};
use crate::aead::KEY_SIZE;
use crate::error::{error_codes, CryptoError, CryptoResult};
use crate::key_management::{KeyMaterial, KeyRecord, KeyScheme};
use crate::secure_memory::SecureBytes;
use crate::utils;

/// `alg` header value: the derived key encrypts the content directly
pub const ALGORITHM: &str = "dir";

/// Bytes of random salt per token
pub const SALT_SIZE: usize = 32;

/// Engine for 32-byte master secrets
#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetricEngine;

impl SymmetricEngine {
    pub fn new() -> Self {
        Self
    }

    fn derive_key(master: &[u8], salt: &[u8], kid: &str) -> CryptoResult<SecureBytes> {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), master);
        let mut okm = vec![0u8; KEY_SIZE];
        hkdf.expand(kid.as_bytes(), &mut okm).map_err(|_| {
            CryptoError::generation_error(
                "derive_key",
                "HKDF expand failed",
                error_codes::KEY_DERIVATION_FAILED,
            )
        })?;
        Ok(SecureBytes::from(okm))
    }

    fn master_secret(record: &KeyRecord) -> Option<&SecureBytes> {
        match record.material() {
            KeyMaterial::Symmetric(secret) => Some(secret),
            KeyMaterial::Asymmetric(_) => None,
        }
    }
}

impl EncryptionEngine for SymmetricEngine {
    fn scheme(&self) -> KeyScheme {
        KeyScheme::Symmetric
    }

    fn generate_record(&self, lifetime: Duration) -> CryptoResult<KeyRecord> {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().simple().to_string();
        Ok(KeyRecord::new(
            id,
            KeyMaterial::generate_symmetric()?,
            now,
            utils::expiry_after(now, lifetime)?,
        ))
    }

    fn encrypt(
        &self,
        payload: &[u8],
        active: &KeyRecord,
        options: &EncryptOptions,
    ) -> CryptoResult<String> {
        let master = Self::master_secret(active)
            .ok_or_else(|| CryptoError::unsupported("encrypt", active.scheme().as_str()))?;

        let salt = utils::random_bytes(SALT_SIZE).map_err(|e| {
            CryptoError::generation_error(
                "generate_salt",
                &e.to_string(),
                error_codes::SALT_GENERATION_FAILED,
            )
        })?;
        let key = Self::derive_key(master.as_bytes(), &salt, active.id())?;

        let cipher = options.cipher_or_default();
        let mut header = envelope::base_header(ALGORITHM, cipher, active.id());
        header.insert("salt".to_string(), Value::from(utils::b64_encode(&salt)));
        envelope::finish_header(
            &mut header,
            utils::unix_now(),
            options.expires_at,
            options.content_type.as_deref(),
            &options.headers,
        )?;

        envelope::seal(&header, cipher, key.as_bytes(), payload)
    }

    fn decrypt(&self, token: &str, candidates: &[&KeyRecord]) -> CryptoResult<Vec<u8>> {
        let envelope = Envelope::parse(token)?;
        envelope.check_expiry(utils::unix_now())?;
        envelope.expect_alg(ALGORITHM)?;
        let cipher = envelope.cipher()?;
        let salt = utils::b64_decode(envelope.str_header("salt")?, "salt")?;

        for record in candidates {
            let Some(master) = Self::master_secret(record) else {
                continue;
            };
            let key = Self::derive_key(master.as_bytes(), &salt, record.id())?;
            if let Ok(plaintext) = envelope.open(cipher, key.as_bytes()) {
                return Ok(plaintext);
            }
        }

        Err(CryptoError::decryption_failed())
    }
}
