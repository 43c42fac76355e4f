//! Compact token envelope
//!
//! A token is five base64url parts joined by dots:
//! `header.encrypted_key.iv.ciphertext.tag`. The header is a JSON object
//! and its encoded form is the AEAD associated data, so editing any header
//! byte breaks authentication.

use serde_json::{Map, Value};

use crate::aead::{ContentCipher, NONCE_SIZE, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::utils;

/// Longest token accepted by the parser
pub const MAX_TOKEN_LEN: usize = 64 * 1024;

/// Header names set by the engines; callers cannot override them
pub const RESERVED_HEADERS: &[&str] = &["alg", "enc", "kid", "salt", "epk", "iat", "exp", "cty"];

/// Start a protected header with the fields every token carries
pub(crate) fn base_header(alg: &str, cipher: ContentCipher, kid: &str) -> Map<String, Value> {
    let mut header = Map::new();
    header.insert("alg".to_string(), Value::from(alg));
    header.insert("enc".to_string(), Value::from(cipher.header_value()));
    header.insert("kid".to_string(), Value::from(kid));
    header
}

/// Add `iat`, `exp`, `cty` and caller headers after the scheme fields
pub(crate) fn finish_header(
    header: &mut Map<String, Value>,
    issued_at: i64,
    expires_at: Option<i64>,
    content_type: Option<&str>,
    extra: &Map<String, Value>,
) -> CryptoResult<()> {
    header.insert("iat".to_string(), Value::from(issued_at));
    if let Some(exp) = expires_at {
        header.insert("exp".to_string(), Value::from(exp));
    }
    if let Some(cty) = content_type {
        header.insert("cty".to_string(), Value::from(cty));
    }
    for (name, value) in extra {
        if RESERVED_HEADERS.contains(&name.as_str()) {
            return Err(CryptoError::invalid_parameter(
                "headers",
                "names other than the reserved token headers",
                name,
            ));
        }
        header.insert(name.clone(), value.clone());
    }
    Ok(())
}

/// Encrypt `plaintext` under `key` and serialize the compact token
pub(crate) fn seal(
    header: &Map<String, Value>,
    cipher: ContentCipher,
    key: &[u8],
    plaintext: &[u8],
) -> CryptoResult<String> {
    let encoded_header = utils::b64_encode(&serde_json::to_vec(header)?);
    let iv = utils::random_bytes(NONCE_SIZE)?;
    let (ciphertext, tag) = cipher.seal(key, &iv, plaintext, encoded_header.as_bytes())?;

    Ok(format!(
        "{}..{}.{}.{}",
        encoded_header,
        utils::b64_encode(&iv),
        utils::b64_encode(&ciphertext),
        utils::b64_encode(&tag)
    ))
}

/// A parsed but not yet decrypted token
#[derive(Debug, Clone)]
pub struct Envelope {
    header: Map<String, Value>,
    encoded_header: String,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl Envelope {
    /// Split and decode a compact token without touching any key
    pub fn parse(token: &str) -> CryptoResult<Self> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(CryptoError::malformed("token exceeds maximum length"));
        }

        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 5 {
            return Err(CryptoError::malformed(&format!(
                "expected 5 token parts, found {}",
                parts.len()
            )));
        }
        if !parts[1].is_empty() {
            return Err(CryptoError::malformed("encrypted key part must be empty"));
        }

        let header_bytes = utils::b64_decode(parts[0], "header")?;
        let header: Map<String, Value> = serde_json::from_slice(&header_bytes)
            .map_err(|_| CryptoError::malformed("header is not a JSON object"))?;

        let iv = utils::b64_decode(parts[2], "iv")?;
        if iv.len() != NONCE_SIZE {
            return Err(CryptoError::malformed("iv has the wrong length"));
        }
        let ciphertext = utils::b64_decode(parts[3], "ciphertext")?;
        let tag = utils::b64_decode(parts[4], "tag")?;
        if tag.len() != TAG_SIZE {
            return Err(CryptoError::malformed("tag has the wrong length"));
        }

        Ok(Self {
            header,
            encoded_header: parts[0].to_string(),
            iv,
            ciphertext,
            tag,
        })
    }

    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// A required string header
    pub fn str_header(&self, name: &str) -> CryptoResult<&str> {
        self.header
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::malformed(&format!("missing '{}' header", name)))
    }

    pub fn kid(&self) -> CryptoResult<&str> {
        self.str_header("kid")
    }

    /// The `exp` header, if present
    pub fn expires_at(&self) -> CryptoResult<Option<i64>> {
        match self.header.get("exp") {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .or_else(|| value.as_f64().map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| CryptoError::malformed("'exp' header is not a number")),
        }
    }

    /// Fail with `Expired` when `exp` lies before `now`
    pub fn check_expiry(&self, now: i64) -> CryptoResult<()> {
        match self.expires_at()? {
            Some(exp) if now > exp => Err(CryptoError::expired(exp)),
            _ => Ok(()),
        }
    }

    /// Check the `alg` header against the engine's algorithm
    pub fn expect_alg(&self, alg: &str) -> CryptoResult<()> {
        let found = self.str_header("alg")?;
        if found != alg {
            return Err(CryptoError::malformed(&format!(
                "unexpected key management algorithm '{}'",
                found
            )));
        }
        Ok(())
    }

    pub fn cipher(&self) -> CryptoResult<ContentCipher> {
        ContentCipher::from_header(self.str_header("enc")?)
    }

    /// Authenticate and decrypt with one content key
    pub fn open(&self, cipher: ContentCipher, key: &[u8]) -> CryptoResult<Vec<u8>> {
        cipher.open(
            key,
            &self.iv,
            &self.ciphertext,
            &self.tag,
            self.encoded_header.as_bytes(),
        )
    }
}
