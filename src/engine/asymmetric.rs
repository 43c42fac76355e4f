//! Elliptic-curve engine
//!
//! Encryption uses ECDH-ES: an ephemeral X25519 key agrees a secret with the
//! record's static agreement key, HKDF-SHA256 turns it into the content key
//! and the ephemeral public key travels in the `epk` header. Signatures are
//! compact JWS with Ed25519 (`EdDSA`).

use chrono::{Duration, Utc};
use ed25519_dalek::{Signature, Signer, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as AgreementPublicKey};

use super::envelope::{self, Envelope};
use super::{EncryptOptions, EncryptionEngine};
use crate::aead::{ContentCipher, KEY_SIZE};
use crate::error::{error_codes, CryptoError, CryptoResult};
use crate::key_management::{
    AsymmetricKeyPair, KeyMaterial, KeyRecord, KeyScheme, PublicKeyEntry, PublicKeySet,
    AGREEMENT_ALGORITHM, SIGNATURE_ALGORITHM,
};
use crate::secure_memory::SecureBytes;
use crate::utils;

/// Length of generated key identifiers
pub const KEY_ID_LEN: usize = 10;

/// Engine for X25519 + Ed25519 key pairs
#[derive(Debug, Clone, Copy, Default)]
pub struct AsymmetricEngine;

fn key_pair(record: &KeyRecord) -> Option<&AsymmetricKeyPair> {
    match record.material() {
        KeyMaterial::Asymmetric(pair) => Some(pair),
        KeyMaterial::Symmetric(_) => None,
    }
}

fn derive_content_key(
    shared: &[u8],
    epk: &AgreementPublicKey,
    recipient: &AgreementPublicKey,
    cipher: ContentCipher,
    kid: &str,
) -> CryptoResult<SecureBytes> {
    let salt = utils::concat_bytes(&[epk.as_bytes(), recipient.as_bytes()]);
    let info = utils::concat_bytes(&[cipher.header_value().as_bytes(), kid.as_bytes()]);
    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = vec![0u8; KEY_SIZE];
    hkdf.expand(&info, &mut okm).map_err(|_| {
        CryptoError::generation_error(
            "derive_content_key",
            "HKDF expand failed",
            error_codes::KEY_DERIVATION_FAILED,
        )
    })?;
    Ok(SecureBytes::from(okm))
}

impl AsymmetricEngine {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt to a published public key, e.g. one taken from a public key set
    pub fn encrypt_to(
        &self,
        payload: &[u8],
        recipient: &PublicKeyEntry,
        options: &EncryptOptions,
    ) -> CryptoResult<String> {
        self.seal_to(payload, &recipient.agreement_key()?, &recipient.kid, options)
    }

    fn seal_to(
        &self,
        payload: &[u8],
        recipient: &AgreementPublicKey,
        kid: &str,
        options: &EncryptOptions,
    ) -> CryptoResult<String> {
        let cipher = options.cipher_or_default();
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let epk = AgreementPublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(recipient);
        let key = derive_content_key(shared.as_bytes(), &epk, recipient, cipher, kid)?;

        let mut header = envelope::base_header(AGREEMENT_ALGORITHM, cipher, kid);
        header.insert(
            "epk".to_string(),
            json!({
                "kty": "OKP",
                "crv": "X25519",
                "x": utils::b64_encode(epk.as_bytes()),
            }),
        );
        envelope::finish_header(
            &mut header,
            utils::unix_now(),
            options.expires_at,
            options.content_type.as_deref(),
            &options.headers,
        )?;

        envelope::seal(&header, cipher, key.as_bytes(), payload)
    }

    fn ephemeral_key(envelope: &Envelope) -> CryptoResult<AgreementPublicKey> {
        let x = envelope
            .header()
            .get("epk")
            .and_then(|epk| epk.get("x"))
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::malformed("missing 'epk' header"))?;
        let bytes: [u8; 32] = utils::b64_decode(x, "epk")?
            .try_into()
            .map_err(|_| CryptoError::malformed("epk must be 32 bytes"))?;
        Ok(AgreementPublicKey::from(bytes))
    }

    /// Verify a compact JWS against published verifying keys
    ///
    /// This is the path for validation-only parties that hold a public key
    /// set but no private material.
    pub fn verify_with_public_keys(&self, token: &str, keys: &PublicKeySet) -> CryptoResult<Vec<u8>> {
        let jws = CompactJws::parse(token)?;
        let mut ordered: Vec<&PublicKeyEntry> = keys.keys.iter().filter(|k| Some(k.kid.as_str()) == jws.kid()).collect();
        ordered.extend(keys.keys.iter().filter(|k| Some(k.kid.as_str()) != jws.kid()));

        for entry in ordered {
            let Ok(verifying) = entry.verifying_key() else {
                continue;
            };
            if jws.verify(&verifying) {
                return Ok(jws.payload);
            }
        }
        Err(CryptoError::verification_failed())
    }
}

impl EncryptionEngine for AsymmetricEngine {
    fn scheme(&self) -> KeyScheme {
        KeyScheme::Asymmetric
    }

    fn generate_record(&self, lifetime: Duration) -> CryptoResult<KeyRecord> {
        let now = Utc::now();
        Ok(KeyRecord::new(
            utils::random_key_id(KEY_ID_LEN),
            KeyMaterial::Asymmetric(AsymmetricKeyPair::generate()),
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
        let pair = key_pair(active)
            .ok_or_else(|| CryptoError::unsupported("encrypt", active.scheme().as_str()))?;
        self.seal_to(payload, &pair.agreement_public(), active.id(), options)
    }

    fn decrypt(&self, token: &str, candidates: &[&KeyRecord]) -> CryptoResult<Vec<u8>> {
        let envelope = Envelope::parse(token)?;
        envelope.check_expiry(utils::unix_now())?;
        envelope.expect_alg(AGREEMENT_ALGORITHM)?;
        let cipher = envelope.cipher()?;
        let epk = Self::ephemeral_key(&envelope)?;
        let kid = envelope.kid()?;

        for record in candidates {
            let Some(pair) = key_pair(record) else {
                continue;
            };
            let shared = pair.agreement_secret().diffie_hellman(&epk);
            if !shared.was_contributory() {
                continue;
            }
            let recipient = pair.agreement_public();
            let key = derive_content_key(shared.as_bytes(), &epk, &recipient, cipher, kid)?;
            if let Ok(plaintext) = envelope.open(cipher, key.as_bytes()) {
                return Ok(plaintext);
            }
        }

        Err(CryptoError::decryption_failed())
    }

    fn supports_signing(&self) -> bool {
        true
    }

    fn sign(&self, payload: &[u8], key: &KeyRecord) -> CryptoResult<String> {
        let pair =
            key_pair(key).ok_or_else(|| CryptoError::unsupported("sign", key.scheme().as_str()))?;

        let mut header = Map::new();
        header.insert("alg".to_string(), Value::from(SIGNATURE_ALGORITHM));
        header.insert("typ".to_string(), Value::from("JWT"));
        header.insert("kid".to_string(), Value::from(key.id()));

        let signing_input = format!(
            "{}.{}",
            utils::b64_encode(&serde_json::to_vec(&header)?),
            utils::b64_encode(payload)
        );
        let signature = pair.signing_key().sign(signing_input.as_bytes());
        Ok(format!("{}.{}", signing_input, utils::b64_encode(&signature.to_bytes())))
    }

    fn verify(&self, token: &str, candidates: &[&KeyRecord]) -> CryptoResult<Vec<u8>> {
        let jws = CompactJws::parse(token)?;

        // Try the key named by `kid` first, then the rest newest first.
        let mut ordered: Vec<&KeyRecord> = candidates
            .iter()
            .copied()
            .filter(|r| Some(r.id()) == jws.kid())
            .collect();
        ordered.extend(candidates.iter().copied().filter(|r| Some(r.id()) != jws.kid()));

        for record in ordered {
            let Some(pair) = key_pair(record) else {
                continue;
            };
            if jws.verify(&pair.verifying_key()) {
                return Ok(jws.payload);
            }
        }
        Err(CryptoError::verification_failed())
    }
}

/// A decoded `header.payload.signature` token
struct CompactJws {
    header: Map<String, Value>,
    signing_input: String,
    payload: Vec<u8>,
    signature: Signature,
}

impl CompactJws {
    fn parse(token: &str) -> CryptoResult<Self> {
        if token.len() > envelope::MAX_TOKEN_LEN {
            return Err(CryptoError::malformed("token exceeds maximum length"));
        }
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(CryptoError::malformed(&format!(
                "expected 3 signed token parts, found {}",
                parts.len()
            )));
        }

        let header: Map<String, Value> =
            serde_json::from_slice(&utils::b64_decode(parts[0], "signature header")?)
                .map_err(|_| CryptoError::malformed("signature header is not a JSON object"))?;
        if header.get("alg").and_then(Value::as_str) != Some(SIGNATURE_ALGORITHM) {
            return Err(CryptoError::malformed("unsupported signature algorithm"));
        }

        let payload = utils::b64_decode(parts[1], "payload")?;
        let signature_bytes: [u8; 64] = utils::b64_decode(parts[2], "signature")?
            .try_into()
            .map_err(|_| CryptoError::malformed("signature must be 64 bytes"))?;

        Ok(Self {
            header,
            signing_input: format!("{}.{}", parts[0], parts[1]),
            payload,
            signature: Signature::from_bytes(&signature_bytes),
        })
    }

    fn kid(&self) -> Option<&str> {
        self.header.get("kid").and_then(Value::as_str)
    }

    fn verify(&self, key: &VerifyingKey) -> bool {
        key.verify_strict(self.signing_input.as_bytes(), &self.signature)
            .is_ok()
    }
}
