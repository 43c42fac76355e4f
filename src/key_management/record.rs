//! Key records and their persistence form
//!
//! A `KeyRecord` is the unit the key manager rotates: an identifier, secret
//! material and the time window it was issued for. Secret material has no
//! public accessor; the only way it leaves the record is `to_stored()`,
//! which key stores use for persistence.

use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey as AgreementPublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::{error_codes, CryptoError, CryptoResult};
use crate::secure_memory::SecureBytes;
use crate::utils;

/// Size of symmetric master keys and of each asymmetric secret half
pub const SECRET_KEY_SIZE: usize = 32;

/// Key-agreement algorithm advertised for asymmetric keys
pub const AGREEMENT_ALGORITHM: &str = "ECDH-ES";

/// Signature algorithm advertised for asymmetric keys
pub const SIGNATURE_ALGORITHM: &str = "EdDSA";

/// Which engine a key record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    /// Raw 32-byte master secret, per-message keys derived with HKDF
    Symmetric,
    /// X25519 agreement key plus Ed25519 signing key
    Asymmetric,
}

impl KeyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyScheme::Symmetric => "symmetric",
            KeyScheme::Asymmetric => "asymmetric",
        }
    }

    pub fn parse(value: &str) -> CryptoResult<Self> {
        match value {
            "symmetric" => Ok(KeyScheme::Symmetric),
            "asymmetric" => Ok(KeyScheme::Asymmetric),
            other => Err(CryptoError::store_error_with_code(
                "load_key",
                &format!("unknown key scheme '{}'", other),
                error_codes::KEY_RECORD_INVALID,
            )),
        }
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elliptic-curve key pair used by the asymmetric engine
///
/// One record carries both halves so a single `kid` names the key used to
/// decrypt a token and the key used to verify its signature.
#[derive(Clone)]
pub struct AsymmetricKeyPair {
    agreement: StaticSecret,
    signing: SigningKey,
}

impl AsymmetricKeyPair {
    /// Generate a fresh key pair from the OS random number generator
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self {
            agreement: StaticSecret::random_from_rng(&mut rng),
            signing: SigningKey::generate(&mut rng),
        }
    }

    /// Rebuild a key pair from its two 32-byte secret halves
    pub fn from_secret_bytes(agreement: &[u8], signing: &[u8]) -> CryptoResult<Self> {
        let mut agreement: [u8; SECRET_KEY_SIZE] = agreement.try_into().map_err(|_| {
            CryptoError::invalid_parameter(
                "agreement_secret",
                "32 bytes",
                &format!("{} bytes", agreement.len()),
            )
        })?;
        let mut signing: [u8; SECRET_KEY_SIZE] = signing.try_into().map_err(|_| {
            CryptoError::invalid_parameter(
                "signing_secret",
                "32 bytes",
                &format!("{} bytes", signing.len()),
            )
        })?;

        let pair = Self {
            agreement: StaticSecret::from(agreement),
            signing: SigningKey::from_bytes(&signing),
        };
        agreement.zeroize();
        signing.zeroize();
        Ok(pair)
    }

    /// Public half of the agreement key
    pub fn agreement_public(&self) -> AgreementPublicKey {
        AgreementPublicKey::from(&self.agreement)
    }

    /// Public half of the signing key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub(crate) fn agreement_secret(&self) -> &StaticSecret {
        &self.agreement
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    fn to_secret_bytes(&self) -> SecureBytes {
        let mut agreement = self.agreement.to_bytes();
        let mut signing = self.signing.to_bytes();
        let joined = SecureBytes::from(utils::concat_bytes(&[&agreement, &signing]));
        agreement.zeroize();
        signing.zeroize();
        joined
    }
}

impl fmt::Debug for AsymmetricKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricKeyPair")
            .field("agreement_public", &utils::b64_encode(self.agreement_public().as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Secret material held by a key record
#[derive(Clone, Debug)]
pub enum KeyMaterial {
    /// 32-byte master secret
    Symmetric(SecureBytes),
    /// X25519 + Ed25519 key pair
    Asymmetric(AsymmetricKeyPair),
}

impl KeyMaterial {
    /// Generate a random 32-byte symmetric master secret
    pub fn generate_symmetric() -> CryptoResult<Self> {
        Ok(KeyMaterial::Symmetric(SecureBytes::from(utils::random_bytes(
            SECRET_KEY_SIZE,
        )?)))
    }

    pub fn scheme(&self) -> KeyScheme {
        match self {
            KeyMaterial::Symmetric(_) => KeyScheme::Symmetric,
            KeyMaterial::Asymmetric(_) => KeyScheme::Asymmetric,
        }
    }
}

/// An immutable key with its identifier and validity window
#[derive(Clone)]
pub struct KeyRecord {
    id: String,
    material: KeyMaterial,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl KeyRecord {
    pub fn new(
        id: impl Into<String>,
        material: KeyMaterial,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            material,
            created_at,
            expires_at,
        }
    }

    /// Key identifier, written to the `kid` header of tokens
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scheme(&self) -> KeyScheme {
        self.material.scheme()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the key should be rotated. Expired keys still decrypt.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub(crate) fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Public half of an asymmetric key, `None` for symmetric keys
    pub fn public_key(&self) -> Option<PublicKeyEntry> {
        match &self.material {
            KeyMaterial::Symmetric(_) => None,
            KeyMaterial::Asymmetric(pair) => Some(PublicKeyEntry {
                kid: self.id.clone(),
                alg: AGREEMENT_ALGORITHM.to_string(),
                crv: "X25519".to_string(),
                x: utils::b64_encode(pair.agreement_public().as_bytes()),
                sig_alg: SIGNATURE_ALGORITHM.to_string(),
                sig_x: utils::b64_encode(pair.verifying_key().as_bytes()),
                exp: self.expires_at.timestamp(),
            }),
        }
    }

    /// Persistence form of this record, including its secret material
    ///
    /// Only key store implementations should call this.
    pub fn to_stored(&self) -> StoredKey {
        let material = match &self.material {
            KeyMaterial::Symmetric(secret) => secret.as_bytes().to_vec(),
            KeyMaterial::Asymmetric(pair) => pair.to_secret_bytes().as_bytes().to_vec(),
        };

        StoredKey {
            id: self.id.clone(),
            scheme: self.scheme(),
            material,
            created_at_ms: self.created_at.timestamp_millis(),
            expires_at_ms: self.expires_at.timestamp_millis(),
        }
    }

    /// Rebuild a record from its persistence form
    pub fn from_stored(stored: &StoredKey) -> CryptoResult<Self> {
        let invalid = |cause: &str| {
            CryptoError::store_error_with_code("load_key", cause, error_codes::KEY_RECORD_INVALID)
        };

        if stored.id.is_empty() {
            return Err(invalid("empty key id"));
        }

        let material = match stored.scheme {
            KeyScheme::Symmetric => {
                if stored.material.len() != SECRET_KEY_SIZE {
                    return Err(invalid("symmetric key material must be 32 bytes"));
                }
                KeyMaterial::Symmetric(SecureBytes::new(&stored.material))
            }
            KeyScheme::Asymmetric => {
                if stored.material.len() != 2 * SECRET_KEY_SIZE {
                    return Err(invalid("asymmetric key material must be 64 bytes"));
                }
                let (agreement, signing) = stored.material.split_at(SECRET_KEY_SIZE);
                KeyMaterial::Asymmetric(AsymmetricKeyPair::from_secret_bytes(agreement, signing)?)
            }
        };

        let created_at = Utc
            .timestamp_millis_opt(stored.created_at_ms)
            .single()
            .ok_or_else(|| invalid("created_at out of range"))?;
        let expires_at = Utc
            .timestamp_millis_opt(stored.expires_at_ms)
            .single()
            .ok_or_else(|| invalid("expires_at out of range"))?;

        Ok(Self {
            id: stored.id.clone(),
            material,
            created_at,
            expires_at,
        })
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("id", &self.id)
            .field("scheme", &self.scheme())
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// Serializable form of a key record as written by key stores
///
/// Timestamps are milliseconds since the Unix epoch. The material buffer is
/// zeroed when the value is dropped.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredKey {
    pub id: String,
    pub scheme: KeyScheme,
    pub material: Vec<u8>,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

impl Drop for StoredKey {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

impl fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredKey")
            .field("id", &self.id)
            .field("scheme", &self.scheme)
            .field("material", &"[REDACTED]")
            .field("created_at_ms", &self.created_at_ms)
            .field("expires_at_ms", &self.expires_at_ms)
            .finish()
    }
}

/// Public part of an asymmetric key, safe to hand to external parties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyEntry {
    pub kid: String,
    /// Key-agreement algorithm for encrypting to this key
    pub alg: String,
    pub crv: String,
    /// X25519 public key, base64url
    pub x: String,
    /// Signature algorithm for tokens signed by this key
    pub sig_alg: String,
    /// Ed25519 verifying key, base64url
    pub sig_x: String,
    /// Rotation deadline of the key, seconds since the Unix epoch
    pub exp: i64,
}

impl PublicKeyEntry {
    /// Decode the Ed25519 verifying key
    pub fn verifying_key(&self) -> CryptoResult<VerifyingKey> {
        let bytes: [u8; 32] = utils::b64_decode(&self.sig_x, "sig_x")?
            .try_into()
            .map_err(|_| CryptoError::malformed("sig_x must be 32 bytes"))?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::malformed("sig_x is not a valid Ed25519 key"))
    }

    /// Decode the X25519 agreement key
    pub fn agreement_key(&self) -> CryptoResult<AgreementPublicKey> {
        let bytes: [u8; 32] = utils::b64_decode(&self.x, "x")?
            .try_into()
            .map_err(|_| CryptoError::malformed("x must be 32 bytes"))?;
        Ok(AgreementPublicKey::from(bytes))
    }
}

/// Public keys of the active and retained keys, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeySet {
    pub keys: Vec<PublicKeyEntry>,
}

impl PublicKeySet {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn find(&self, kid: &str) -> Option<&PublicKeyEntry> {
        self.keys.iter().find(|entry| entry.kid == kid)
    }

    pub fn to_json(&self) -> CryptoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> CryptoResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn symmetric_record(id: &str) -> KeyRecord {
        let now = Utc::now();
        KeyRecord::new(
            id,
            KeyMaterial::generate_symmetric().unwrap(),
            now,
            now + Duration::minutes(5),
        )
    }

    #[test]
    fn test_debug_never_prints_material() {
        let record = symmetric_record("encryption-key-1");
        let printed = format!("{:?}", record);
        assert!(printed.contains("encryption-key-1"));
        assert!(printed.contains("REDACTED"));

        let stored = record.to_stored();
        assert!(format!("{:?}", stored).contains("REDACTED"));
    }

    #[test]
    fn test_symmetric_stored_form() {
        let record = symmetric_record("k1");
        let stored = record.to_stored();
        assert_eq!(stored.scheme, KeyScheme::Symmetric);
        assert_eq!(stored.material.len(), SECRET_KEY_SIZE);

        let restored = KeyRecord::from_stored(&stored).unwrap();
        assert_eq!(restored.id(), "k1");
        assert_eq!(
            restored.expires_at().timestamp_millis(),
            record.expires_at().timestamp_millis()
        );
        assert!(restored.public_key().is_none());
    }

    #[test]
    fn test_asymmetric_stored_form_keeps_public_key() {
        let now = Utc::now();
        let record = KeyRecord::new(
            "abcdefghij",
            KeyMaterial::Asymmetric(AsymmetricKeyPair::generate()),
            now,
            now + Duration::minutes(5),
        );
        let restored = KeyRecord::from_stored(&record.to_stored()).unwrap();

        assert_eq!(restored.scheme(), KeyScheme::Asymmetric);
        assert_eq!(restored.public_key(), record.public_key());
    }

    #[test]
    fn test_from_stored_rejects_bad_material() {
        let mut stored = symmetric_record("k1").to_stored();
        stored.material.truncate(10);
        assert!(matches!(
            KeyRecord::from_stored(&stored),
            Err(CryptoError::StoreError { .. })
        ));
    }

    #[test]
    fn test_expiry_is_advisory_query() {
        let now = Utc::now();
        let record = KeyRecord::new(
            "old",
            KeyMaterial::generate_symmetric().unwrap(),
            now - Duration::minutes(10),
            now - Duration::minutes(5),
        );
        assert!(record.is_expired_at(now));
        assert!(!record.is_expired_at(now - Duration::minutes(6)));
    }

    #[test]
    fn test_public_key_entry_decodes() {
        let pair = AsymmetricKeyPair::generate();
        let now = Utc::now();
        let record = KeyRecord::new("kid", KeyMaterial::Asymmetric(pair.clone()), now, now);
        let entry = record.public_key().unwrap();

        assert_eq!(entry.verifying_key().unwrap(), pair.verifying_key());
        assert_eq!(entry.agreement_key().unwrap().as_bytes(), pair.agreement_public().as_bytes());

        let set = PublicKeySet { keys: vec![entry] };
        let parsed = PublicKeySet::from_json(&set.to_json().unwrap()).unwrap();
        assert!(parsed.find("kid").is_some());
    }
}
