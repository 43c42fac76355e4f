/*!
 * Key manager configuration
 *
 * Everything the core needs is passed in at construction. Nothing here reads
 * the process environment; a service composes a `KeyManagerConfig` from its
 * own settings (or deserializes one) and hands it to the key manager.
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::aead::ContentCipher;
use crate::error::{CryptoError, CryptoResult};
use crate::utils;

/// Rotation and token lifetime settings for a key manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyManagerConfig {
    /// How long a freshly generated key stays current before it must rotate
    #[serde(with = "duration_secs")]
    pub rotation_period: Duration,

    /// Maximum number of retired keys kept for decryption. `None` keeps all.
    pub max_history: Option<usize>,

    /// Token lifetime used when the caller does not pass one
    #[serde(with = "duration_secs")]
    pub default_token_ttl: Duration,

    /// Rotate inside the issuing call when the current key has expired
    pub rotate_on_expiry: bool,

    /// Content encryption written to the `enc` header of new tokens
    pub content_cipher: ContentCipher,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            rotation_period: Duration::from_secs(24 * 60 * 60),
            max_history: Some(5),
            default_token_ttl: Duration::from_secs(2 * 60 * 60),
            rotate_on_expiry: true,
            content_cipher: ContentCipher::A256Gcm,
        }
    }
}

impl KeyManagerConfig {
    /// Create a config with the given rotation period and retention bound
    pub fn new(rotation_period: Duration, max_history: Option<usize>) -> Self {
        Self {
            rotation_period,
            max_history,
            ..Self::default()
        }
    }

    /// Set the default token lifetime
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_token_ttl = ttl;
        self
    }

    /// Enable or disable rotation inside issuing calls
    pub fn with_rotate_on_expiry(mut self, enabled: bool) -> Self {
        self.rotate_on_expiry = enabled;
        self
    }

    /// Select the content cipher for new tokens
    pub fn with_content_cipher(mut self, cipher: ContentCipher) -> Self {
        self.content_cipher = cipher;
        self
    }

    /// Parse a config from JSON, filling missing fields with defaults
    ///
    /// Durations are given in whole seconds.
    pub fn from_json_str(json: &str) -> CryptoResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the key manager cannot work with
    pub fn validate(&self) -> CryptoResult<()> {
        if self.rotation_period.is_zero() {
            return Err(CryptoError::invalid_parameter(
                "rotation_period",
                "a positive duration",
                "0s",
            ));
        }
        let period = chrono::Duration::from_std(self.rotation_period).map_err(|_| {
            CryptoError::invalid_parameter(
                "rotation_period",
                "a representable duration",
                &format!("{:?}", self.rotation_period),
            )
        })?;
        // Every generated key expires one period after creation
        utils::expiry_after(chrono::Utc::now(), period)?;
        if self.default_token_ttl.is_zero() {
            return Err(CryptoError::invalid_parameter(
                "default_token_ttl",
                "a positive duration",
                "0s",
            ));
        }
        Ok(())
    }
}

/// Settings for short-lived keys, e.g. for services issuing session tokens
/// that should not outlive an hour-long key window
pub fn short_lived_params() -> KeyManagerConfig {
    KeyManagerConfig {
        rotation_period: Duration::from_secs(60 * 60),
        max_history: Some(2),
        default_token_ttl: Duration::from_secs(15 * 60),
        rotate_on_expiry: true,
        content_cipher: ContentCipher::A256Gcm,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = KeyManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_history, Some(5));
        assert_eq!(config.default_token_ttl, Duration::from_secs(7200));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = KeyManagerConfig::from_json_str(
            r#"{ "rotation_period": 600, "max_history": 3, "content_cipher": "C20P" }"#,
        )
        .unwrap();

        assert_eq!(config.rotation_period, Duration::from_secs(600));
        assert_eq!(config.max_history, Some(3));
        assert_eq!(config.content_cipher, ContentCipher::ChaCha20Poly1305);
        assert!(config.rotate_on_expiry);
    }

    #[test]
    fn test_zero_rotation_period_rejected() {
        let config = KeyManagerConfig::new(Duration::ZERO, None);
        assert!(matches!(
            config.validate(),
            Err(CryptoError::InvalidParameter { .. })
        ));
        assert!(KeyManagerConfig::from_json_str(r#"{ "rotation_period": 0 }"#).is_err());
    }

    #[test]
    fn test_out_of_range_rotation_period_rejected() {
        let config = KeyManagerConfig::new(Duration::from_secs(1_000_000 * 365 * 24 * 3600), Some(2));
        assert!(matches!(
            config.validate(),
            Err(CryptoError::InvalidParameter { .. })
        ));
        assert!(KeyManagerConfig::from_json_str(r#"{ "rotation_period": 31536000000000 }"#).is_err());
    }

    #[test]
    fn test_short_lived_params() {
        let config = short_lived_params();
        assert!(config.validate().is_ok());
        assert!(config.default_token_ttl < config.rotation_period);
    }
}
