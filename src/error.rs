/*!
 * Error Handling for the Keyseal Token Engine
 *
 * Provides the error type shared by key stores, the key manager, the
 * encryption engines and the token service, together with numeric error
 * codes and user-facing messages.
 */

use std::collections::HashMap;
use thiserror::Error;

/// Error type for all key lifecycle and token operations
///
/// `DecryptionFailed` and `VerificationFailed` intentionally carry no detail
/// about which key was tried or why authentication failed.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {operation} - {cause}")]
    GenerationError {
        operation: String,
        cause: String,
        error_code: u32,
    },

    #[error("Key store error: {operation} - {cause}")]
    StoreError {
        operation: String,
        cause: String,
        error_code: u32,
        context: HashMap<String, String>,
    },

    #[error("Operation '{operation}' is not allowed in validation only mode")]
    ModeError { operation: String, error_code: u32 },

    #[error("Token has expired")]
    Expired { expired_at: i64, error_code: u32 },

    #[error("Failed to decrypt token with any known key")]
    DecryptionFailed { error_code: u32 },

    #[error("Token signature verification failed")]
    VerificationFailed { error_code: u32 },

    #[error("Malformed token: {cause}")]
    MalformedToken { cause: String, error_code: u32 },

    #[error("Invalid parameter: {parameter} - {expected} - got {actual}")]
    InvalidParameter {
        parameter: String,
        expected: String,
        actual: String,
        error_code: u32,
    },

    #[error("Operation not supported: {operation} with {scheme} keys")]
    UnsupportedOperation {
        operation: String,
        scheme: String,
        error_code: u32,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Error code constants for different error categories
pub mod error_codes {
    // Key generation errors: 1000-1999
    pub const KEY_GENERATION_FAILED: u32 = 1001;
    pub const SALT_GENERATION_FAILED: u32 = 1002;
    pub const KEY_DERIVATION_FAILED: u32 = 1003;

    // Key store errors: 2000-2999
    pub const KEY_STORAGE_FAILED: u32 = 2001;
    pub const KEY_RETRIEVAL_FAILED: u32 = 2002;
    pub const KEY_STORE_EMPTY: u32 = 2003;
    pub const KEY_PRUNE_FAILED: u32 = 2004;
    pub const KEY_RECORD_INVALID: u32 = 2005;

    // Key manager errors: 3000-3999
    pub const VALIDATION_ONLY_MODE: u32 = 3001;
    pub const NO_ACTIVE_KEY: u32 = 3002;

    // Token errors: 4000-4999
    pub const TOKEN_EXPIRED: u32 = 4001;
    pub const TOKEN_DECRYPTION_FAILED: u32 = 4002;
    pub const TOKEN_VERIFICATION_FAILED: u32 = 4003;
    pub const TOKEN_MALFORMED: u32 = 4004;

    // AEAD errors: 5000-5999
    pub const AEAD_ENCRYPTION_FAILED: u32 = 5001;
    pub const AEAD_INVALID_KEY_SIZE: u32 = 5002;
    pub const AEAD_INVALID_NONCE_SIZE: u32 = 5003;

    // General errors: 9000-9999
    pub const SERIALIZATION_FAILED: u32 = 9001;
    pub const INVALID_PARAMETER: u32 = 9002;
    pub const UNSUPPORTED_OPERATION: u32 = 9003;
}

impl CryptoError {
    /// Get the numeric error code for this error
    pub fn error_code(&self) -> u32 {
        match self {
            CryptoError::GenerationError { error_code, .. } => *error_code,
            CryptoError::StoreError { error_code, .. } => *error_code,
            CryptoError::ModeError { error_code, .. } => *error_code,
            CryptoError::Expired { error_code, .. } => *error_code,
            CryptoError::DecryptionFailed { error_code } => *error_code,
            CryptoError::VerificationFailed { error_code } => *error_code,
            CryptoError::MalformedToken { error_code, .. } => *error_code,
            CryptoError::InvalidParameter { error_code, .. } => *error_code,
            CryptoError::UnsupportedOperation { error_code, .. } => *error_code,
            CryptoError::SerializationError(_) => error_codes::SERIALIZATION_FAILED,
        }
    }

    /// Get a user-friendly error message
    ///
    /// `Expired` gets its own message so callers can ask the user to sign in
    /// again instead of reporting an invalid credential.
    pub fn user_friendly_message(&self) -> String {
        match self {
            CryptoError::GenerationError { .. } => {
                "Key generation failed. Check the system random number generator.".to_string()
            }
            CryptoError::StoreError { operation, .. } => {
                format!(
                    "Key store operation '{}' failed. Keys cannot be persisted or loaded.",
                    operation
                )
            }
            CryptoError::ModeError { operation, .. } => {
                format!(
                    "'{}' requires an issuer key manager; this instance only validates tokens.",
                    operation
                )
            }
            CryptoError::Expired { .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            CryptoError::DecryptionFailed { .. } | CryptoError::VerificationFailed { .. } => {
                "The token is invalid.".to_string()
            }
            CryptoError::MalformedToken { .. } => "The token is not in a recognised format.".to_string(),
            CryptoError::InvalidParameter {
                parameter,
                expected,
                ..
            } => {
                format!(
                    "Invalid parameter '{}'. Expected '{}'.",
                    parameter, expected
                )
            }
            CryptoError::UnsupportedOperation {
                operation, scheme, ..
            } => {
                format!(
                    "Operation '{}' is not supported for '{}' keys.",
                    operation, scheme
                )
            }
            CryptoError::SerializationError(_) => {
                "Data serialization failed. Data format may be corrupted.".to_string()
            }
        }
    }

    /// Get technical details for debugging
    pub fn technical_details(&self) -> HashMap<String, String> {
        let mut details = HashMap::new();

        details.insert("error_code".to_string(), self.error_code().to_string());
        details.insert("error_type".to_string(), self.error_type().to_string());
        details.insert("timestamp".to_string(), chrono::Utc::now().to_rfc3339());

        match self {
            CryptoError::StoreError {
                operation,
                cause,
                context,
                ..
            } => {
                details.insert("operation".to_string(), operation.clone());
                details.insert("cause".to_string(), cause.clone());
                details.extend(context.clone());
            }
            CryptoError::GenerationError {
                operation, cause, ..
            } => {
                details.insert("operation".to_string(), operation.clone());
                details.insert("cause".to_string(), cause.clone());
            }
            CryptoError::Expired { expired_at, .. } => {
                details.insert("expired_at".to_string(), expired_at.to_string());
            }
            CryptoError::InvalidParameter {
                parameter,
                expected,
                actual,
                ..
            } => {
                details.insert("parameter".to_string(), parameter.clone());
                details.insert("expected".to_string(), expected.clone());
                details.insert("actual".to_string(), actual.clone());
            }
            _ => {
                details.insert("details".to_string(), self.to_string());
            }
        }

        details
    }

    /// Get the error category/type as a string
    pub fn error_type(&self) -> &'static str {
        match self {
            CryptoError::GenerationError { .. } => "GenerationError",
            CryptoError::StoreError { .. } => "StoreError",
            CryptoError::ModeError { .. } => "ModeError",
            CryptoError::Expired { .. } => "Expired",
            CryptoError::DecryptionFailed { .. } => "DecryptionFailed",
            CryptoError::VerificationFailed { .. } => "VerificationFailed",
            CryptoError::MalformedToken { .. } => "MalformedToken",
            CryptoError::InvalidParameter { .. } => "InvalidParameter",
            CryptoError::UnsupportedOperation { .. } => "UnsupportedOperation",
            CryptoError::SerializationError(_) => "SerializationError",
        }
    }

    /// Whether a retry after refreshing the key view could succeed
    pub fn is_key_mismatch(&self) -> bool {
        matches!(
            self,
            CryptoError::DecryptionFailed { .. } | CryptoError::VerificationFailed { .. }
        )
    }
}

/// Convenience constructors for common error types
impl CryptoError {
    pub fn generation_error(operation: &str, cause: &str, error_code: u32) -> Self {
        CryptoError::GenerationError {
            operation: operation.to_string(),
            cause: cause.to_string(),
            error_code,
        }
    }

    pub fn store_error(operation: &str, cause: &str, store: &str) -> Self {
        let mut context = HashMap::new();
        context.insert("store".to_string(), store.to_string());

        CryptoError::StoreError {
            operation: operation.to_string(),
            cause: cause.to_string(),
            error_code: error_codes::KEY_STORAGE_FAILED,
            context,
        }
    }

    pub fn store_error_with_code(operation: &str, cause: &str, error_code: u32) -> Self {
        CryptoError::StoreError {
            operation: operation.to_string(),
            cause: cause.to_string(),
            error_code,
            context: HashMap::new(),
        }
    }

    pub fn mode_error(operation: &str) -> Self {
        CryptoError::ModeError {
            operation: operation.to_string(),
            error_code: error_codes::VALIDATION_ONLY_MODE,
        }
    }

    pub fn expired(expired_at: i64) -> Self {
        CryptoError::Expired {
            expired_at,
            error_code: error_codes::TOKEN_EXPIRED,
        }
    }

    pub fn decryption_failed() -> Self {
        CryptoError::DecryptionFailed {
            error_code: error_codes::TOKEN_DECRYPTION_FAILED,
        }
    }

    pub fn verification_failed() -> Self {
        CryptoError::VerificationFailed {
            error_code: error_codes::TOKEN_VERIFICATION_FAILED,
        }
    }

    pub fn malformed(cause: &str) -> Self {
        CryptoError::MalformedToken {
            cause: cause.to_string(),
            error_code: error_codes::TOKEN_MALFORMED,
        }
    }

    pub fn invalid_parameter(parameter: &str, expected: &str, actual: &str) -> Self {
        CryptoError::InvalidParameter {
            parameter: parameter.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            error_code: error_codes::INVALID_PARAMETER,
        }
    }

    pub fn unsupported(operation: &str, scheme: &str) -> Self {
        CryptoError::UnsupportedOperation {
            operation: operation.to_string(),
            scheme: scheme.to_string(),
            error_code: error_codes::UNSUPPORTED_OPERATION,
        }
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::SerializationError(err.to_string())
    }
}

/// Result type alias for key and token operations
pub type CryptoResult<T> = Result<T, CryptoError>;
