use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use chacha20poly1305::ChaCha20Poly1305;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{error_codes, CryptoError, CryptoResult};

/// Content-encryption key size in bytes for every supported cipher
pub const KEY_SIZE: usize = 32;

/// Nonce size in bytes for every supported cipher
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Content-encryption algorithm named by the `enc` token header
///
/// Both ciphers take a 32-byte key and a 96-bit nonce and append a 16-byte
/// tag, so the envelope layout is identical for either choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContentCipher {
    /// AES-256-GCM
    #[default]
    #[serde(rename = "A256GCM")]
    A256Gcm,
    /// ChaCha20-Poly1305
    #[serde(rename = "C20P")]
    ChaCha20Poly1305,
}

impl ContentCipher {
    /// The value written to the `enc` header
    pub fn header_value(&self) -> &'static str {
        match self {
            ContentCipher::A256Gcm => "A256GCM",
            ContentCipher::ChaCha20Poly1305 => "C20P",
        }
    }

    /// Parse the `enc` header of an incoming token
    pub fn from_header(value: &str) -> CryptoResult<Self> {
        match value {
            "A256GCM" => Ok(ContentCipher::A256Gcm),
            "C20P" => Ok(ContentCipher::ChaCha20Poly1305),
            other => Err(CryptoError::malformed(&format!(
                "unsupported content encryption '{}'",
                other
            ))),
        }
    }

    /// Encrypt `plaintext` and return `(ciphertext, tag)` as separate parts
    pub fn seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
        let mut sealed = match self {
            ContentCipher::A256Gcm => AesGcm::new(key)?.encrypt(plaintext, nonce, Some(associated_data))?,
            ContentCipher::ChaCha20Poly1305 => {
                check_sizes(key, nonce)?;
                let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
                let payload = Payload {
                    msg: plaintext,
                    aad: associated_data,
                };
                cipher
                    .encrypt(chacha20poly1305::Nonce::from_slice(nonce), payload)
                    .map_err(|e| CryptoError::generation_error(
                        "content_encryption",
                        &format!("ChaCha20-Poly1305 encryption failed: {}", e),
                        error_codes::AEAD_ENCRYPTION_FAILED,
                    ))?
            }
        };

        let tag = sealed.split_off(sealed.len() - TAG_SIZE);
        Ok((sealed, tag))
    }

    /// Authenticate and decrypt a `(ciphertext, tag)` pair
    ///
    /// Any authentication failure is reported as `DecryptionFailed`.
    pub fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        associated_data: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        if tag.len() != TAG_SIZE {
            return Err(CryptoError::decryption_failed());
        }

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        match self {
            ContentCipher::A256Gcm => AesGcm::new(key)?.decrypt(&sealed, nonce, Some(associated_data)),
            ContentCipher::ChaCha20Poly1305 => {
                check_sizes(key, nonce)?;
                let cipher = ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key));
                let payload = Payload {
                    msg: &sealed,
                    aad: associated_data,
                };
                cipher
                    .decrypt(chacha20poly1305::Nonce::from_slice(nonce), payload)
                    .map_err(|_| CryptoError::decryption_failed())
            }
        }
    }
}

impl fmt::Display for ContentCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value())
    }
}

fn check_sizes(key: &[u8], nonce: &[u8]) -> CryptoResult<()> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidParameter {
            parameter: "key".to_string(),
            expected: format!("{} bytes", KEY_SIZE),
            actual: format!("{} bytes", key.len()),
            error_code: error_codes::AEAD_INVALID_KEY_SIZE,
        });
    }
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidParameter {
            parameter: "nonce".to_string(),
            expected: format!("{} bytes", NONCE_SIZE),
            actual: format!("{} bytes", nonce.len()),
            error_code: error_codes::AEAD_INVALID_NONCE_SIZE,
        });
    }
    Ok(())
}

/// AES-256-GCM cipher for authenticated encryption
///
/// This struct provides authenticated encryption with associated data (AEAD)
/// using the AES-256-GCM algorithm. In token envelopes the associated data is
/// the encoded protected header.
///
/// # Examples
///
/// ```
/// use keyseal::aead::AesGcm;
///
/// let key = [0x42; 32];
/// let cipher = AesGcm::new(&key).unwrap();
/// let nonce = [0x24; 12];
///
/// let ciphertext = cipher.encrypt(b"Secret message", &nonce, Some(b"header")).unwrap();
/// let decrypted = cipher.decrypt(&ciphertext, &nonce, Some(b"header")).unwrap();
/// assert_eq!(decrypted, b"Secret message");
/// ```
#[derive(Clone)]
pub struct AesGcm {
    cipher: Arc<Aes256Gcm>,
}

impl fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcm")
            .field("cipher", &"[AES-256-GCM Cipher]")
            .finish()
    }
}

impl AesGcm {
    /// Create a new AES-GCM cipher with the given key
    ///
    /// # Arguments
    ///
    /// * `key` - A 32-byte key (e.g., derived per message with HKDF)
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not exactly 32 bytes long
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidParameter {
                parameter: "key".to_string(),
                expected: format!("{} bytes", KEY_SIZE),
                actual: format!("{} bytes", key.len()),
                error_code: error_codes::AEAD_INVALID_KEY_SIZE,
            });
        }

        let key = Key::<Aes256Gcm>::from_slice(key);
        let cipher = Arc::new(Aes256Gcm::new(key));

        Ok(Self { cipher })
    }

    /// Encrypt plaintext using AES-GCM
    ///
    /// The returned ciphertext has the 16-byte authentication tag appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the nonce is not exactly 12 bytes or if
    /// encryption fails
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        nonce: &[u8],
        associated_data: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidParameter {
                parameter: "nonce".to_string(),
                expected: format!("{} bytes", NONCE_SIZE),
                actual: format!("{} bytes", nonce.len()),
                error_code: error_codes::AEAD_INVALID_NONCE_SIZE,
            });
        }

        let nonce = Nonce::from_slice(nonce);
        let payload = Payload {
            msg: plaintext,
            aad: associated_data.unwrap_or(&[]),
        };

        self.cipher.encrypt(nonce, payload).map_err(|e| {
            CryptoError::generation_error(
                "content_encryption",
                &format!("AES-GCM encryption failed: {}", e),
                error_codes::AEAD_ENCRYPTION_FAILED,
            )
        })
    }

    /// Decrypt ciphertext using AES-GCM
    ///
    /// Fails if the ciphertext, tag or associated data were modified.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a wrong nonce size and
    /// `DecryptionFailed` for any authentication failure
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        associated_data: Option<&[u8]>,
    ) -> CryptoResult<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidParameter {
                parameter: "nonce".to_string(),
                expected: format!("{} bytes", NONCE_SIZE),
                actual: format!("{} bytes", nonce.len()),
                error_code: error_codes::AEAD_INVALID_NONCE_SIZE,
            });
        }

        let nonce = Nonce::from_slice(nonce);
        let payload = Payload {
            msg: ciphertext,
            aad: associated_data.unwrap_or(&[]),
        };

        self.cipher
            .decrypt(nonce, payload)
            .map_err(|_| CryptoError::decryption_failed())
    }
}
