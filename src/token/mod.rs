/*!
 * Token service
 *
 * Issues opaque tokens from claim sets and parses them back. With the
 * elliptic-curve engine a token is signed first and the signed form is then
 * encrypted; with the symmetric engine the claims are encrypted directly.
 */

use log::{debug, warn};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{EncryptOptions, EncryptionEngine};
use crate::error::{CryptoError, CryptoResult};
use crate::key_management::KeyManager;
use crate::utils;

pub mod claims;

pub use claims::Claims;
use claims::{EXPIRES_AT, ISSUED_AT};


/// `cty` header value marking an encrypted signed token
pub const NESTED_CONTENT_TYPE: &str = "JWT";

/// Issues and parses tokens through a shared key manager
pub struct TokenService<E: EncryptionEngine> {
    manager: Arc<KeyManager<E>>,
    extra_headers: Map<String, Value>,
}

impl<E: EncryptionEngine> TokenService<E> {
    pub fn new(manager: Arc<KeyManager<E>>) -> Self {
        Self {
            manager,
            extra_headers: Map::new(),
        }
    }

    /// Add a header written into every issued token
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn manager(&self) -> &Arc<KeyManager<E>> {
        &self.manager
    }

    /// Issue a token for `claims`
    ///
    /// `iat` and `exp` claims are added first, so a caller that sets them
    /// explicitly overrides the computed values. `ttl` defaults to the
    /// manager's configured token lifetime.
    pub fn issue(&self, claims: &Claims, ttl: Option<Duration>) -> CryptoResult<String> {
        let ttl = ttl.unwrap_or(self.manager.config().default_token_ttl);
        let now = utils::unix_now();
        let exp = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));

        let mut document = Claims::new();
        document.insert(ISSUED_AT, now).insert(EXPIRES_AT, exp);
        document.extend(claims);

        let mut options = EncryptOptions {
            expires_at: document.expires_at(),
            headers: self.extra_headers.clone(),
            ..EncryptOptions::default()
        };

        let payload = document.to_json_bytes()?;
        let token = if self.manager.engine().supports_signing() {
            options.content_type = Some(NESTED_CONTENT_TYPE.to_string());
            self.manager.sign_and_encrypt(&payload, &options)?
        } else {
            self.manager.encrypt(&payload, &options)?
        };

        debug!("Issued token with {} claims", document.len());
        Ok(token)
    }

    /// Parse a token back into its claims
    ///
    /// When no known key fits, the key view may be stale: the manager is
    /// refreshed from its store and the parse is retried exactly once.
    pub fn parse(&self, token: &str) -> CryptoResult<Claims> {
        match self.parse_once(token) {
            Err(err) if err.is_key_mismatch() => {
                warn!("Token did not match any known key, refreshing keys and retrying");
                if let Err(refresh_err) = self.manager.refresh() {
                    warn!("Key refresh failed: {}", refresh_err);
                    return Err(err);
                }
                self.parse_once(token)
            }
            other => other,
        }
    }

    fn parse_once(&self, token: &str) -> CryptoResult<Claims> {
        let plaintext = self.manager.decrypt(token)?;

        let payload = if self.manager.engine().supports_signing() {
            let signed = std::str::from_utf8(&plaintext)
                .map_err(|_| CryptoError::malformed("signed token is not valid UTF-8"))?;
            self.manager.verify(signed)?
        } else {
            plaintext
        };

        let claims = Claims::from_json_bytes(&payload)?;
        if let Some(exp) = claims.expires_at() {
            if utils::unix_now() > exp {
                return Err(CryptoError::expired(exp));
            }
        }
        Ok(claims)
    }
}
