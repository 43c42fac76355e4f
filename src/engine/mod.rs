/*!
 * Token encryption engines
 *
 * An engine turns a payload plus a key record into a compact token and back.
 * The key manager is generic over the engine, so one manager type serves
 * both the derived-key symmetric scheme and the elliptic-curve scheme.
 */

use chrono::Duration;
use serde_json::{Map, Value};

use crate::aead::ContentCipher;
use crate::error::{CryptoError, CryptoResult};
use crate::key_management::{KeyRecord, KeyScheme};

pub mod asymmetric;
pub mod envelope;
pub mod symmetric;

pub use asymmetric::AsymmetricEngine;
pub use envelope::{Envelope, MAX_TOKEN_LEN, RESERVED_HEADERS};
pub use symmetric::SymmetricEngine;

#[cfg(test)]
mod tests;

/// Header options for a single encryption
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// Absolute `exp` header, seconds since the Unix epoch
    pub expires_at: Option<i64>,
    /// Caller extension headers; reserved names are rejected
    pub headers: Map<String, Value>,
    /// Content cipher, `A256GCM` when unset
    pub cipher: Option<ContentCipher>,
    /// `cty` header, set to `JWT` for nested signed tokens
    pub content_type: Option<String>,
}

impl EncryptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire the token `ttl` from now
    pub fn with_expires_in(mut self, ttl: std::time::Duration) -> Self {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.expires_at = Some(crate::utils::unix_now().saturating_add(ttl));
        self
    }

    pub fn with_expires_at(mut self, exp: i64) -> Self {
        self.expires_at = Some(exp);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cipher(mut self, cipher: ContentCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn with_content_type(mut self, cty: impl Into<String>) -> Self {
        self.content_type = Some(cty.into());
        self
    }

    pub(crate) fn cipher_or_default(&self) -> ContentCipher {
        self.cipher.unwrap_or_default()
    }
}

/// Encryption strategy used by the key manager
///
/// `decrypt` receives the candidate keys newest first and must return the
/// first successful result. When no candidate works it returns a bare
/// `DecryptionFailed`, whatever the reason each attempt failed.
pub trait EncryptionEngine: Send + Sync {
    /// Kind of key record this engine works with
    fn scheme(&self) -> KeyScheme;

    /// Generate a key record that expires `lifetime` from now
    fn generate_record(&self, lifetime: Duration) -> CryptoResult<KeyRecord>;

    fn encrypt(
        &self,
        payload: &[u8],
        active: &KeyRecord,
        options: &EncryptOptions,
    ) -> CryptoResult<String>;

    fn decrypt(&self, token: &str, candidates: &[&KeyRecord]) -> CryptoResult<Vec<u8>>;

    /// Whether `sign` and `verify` are available
    fn supports_signing(&self) -> bool {
        false
    }

    fn sign(&self, payload: &[u8], key: &KeyRecord) -> CryptoResult<String> {
        let _ = (payload, key);
        Err(CryptoError::unsupported("sign", self.scheme().as_str()))
    }

    fn verify(&self, token: &str, candidates: &[&KeyRecord]) -> CryptoResult<Vec<u8>> {
        let _ = (token, candidates);
        Err(CryptoError::unsupported("verify", self.scheme().as_str()))
    }
}
