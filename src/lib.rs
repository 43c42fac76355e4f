/*!
 * Keyseal Token Engine
 *
 * This crate implements key lifecycle management and encrypted tokens for
 * services that issue and validate session or identity credentials across a
 * fleet of instances.
 *
 * The main building blocks are:
 *
 * - A key manager that rotates keys on a schedule and keeps a bounded
 *   history of retired keys, in issuer or validation-only mode
 * - Key stores (in-memory, SQLite and split active/previous backends)
 * - A symmetric engine deriving a fresh AES-256-GCM key per token with HKDF
 * - An elliptic-curve engine using X25519 key agreement and Ed25519 signatures
 * - A token service that signs and encrypts claim sets
 *
 * Tokens issued under a retired key stay valid until that key is pruned
 * from history, so rotation never invalidates live sessions.
 */

/// Authenticated encryption of token content
pub mod aead;

/// Configuration consumed by the key manager
pub mod config;

/// Token encryption engines
pub mod engine;

/// Common error types
pub mod error;

/// Key records, stores and the key manager
pub mod key_management;

/// Secure memory handling utilities
pub mod secure_memory;

/// Token service and claims
pub mod token;

/// Utilities for randomness and encoding
pub mod utils;

// Re-export main types for convenience
pub use config::KeyManagerConfig;
pub use engine::{AsymmetricEngine, EncryptOptions, EncryptionEngine, SymmetricEngine};
pub use error::{CryptoError, CryptoResult};
pub use key_management::{
    InMemoryKeyStore, KeyManager, KeyRecord, KeyStore, ManagerMode, PublicKeySet,
};
pub use token::{Claims, TokenService};

/// Initialize the token engine.
///
/// No backend needs global setup today; the function exists so services
/// have one place to call during startup. It logs the crate version.
///
/// # Example
///
/// ```
/// use keyseal::prelude::*;
///
/// fn main() -> Result<(), CryptoError> {
///     init()?;
///     Ok(())
/// }
/// ```
pub fn init() -> Result<(), CryptoError> {
    log::debug!("keyseal {} initialized", env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Provides a simplified interface to the most commonly used operations.
pub mod prelude {
    pub use crate::aead::ContentCipher;
    pub use crate::config::short_lived_params;
    pub use crate::config::KeyManagerConfig;
    pub use crate::engine::AsymmetricEngine;
    pub use crate::engine::EncryptOptions;
    pub use crate::engine::EncryptionEngine;
    pub use crate::engine::SymmetricEngine;
    pub use crate::init;
    pub use crate::key_management::InMemoryKeyStore;
    pub use crate::key_management::InMemorySplitStore;
    pub use crate::key_management::KeyManager;
    pub use crate::key_management::KeyRecord;
    pub use crate::key_management::KeyStore;
    pub use crate::key_management::ManagerMode;
    pub use crate::key_management::PublicKeySet;
    pub use crate::key_management::SplitStoreAdapter;
    #[cfg(feature = "sql-store")]
    pub use crate::key_management::SqlKeyStore;
    pub use crate::secure_memory::SecureBytes;
    pub use crate::token::Claims;
    pub use crate::token::TokenService;
    pub use crate::CryptoError;
    pub use crate::CryptoResult;

    use std::sync::Arc;

    /// Build an initialized issuer and a token service for encrypted tokens
    ///
    /// Tokens are encrypted with per-token keys derived from a rotating
    /// master secret. Only holders of the store can read them.
    pub fn symmetric_token_service(
        config: KeyManagerConfig,
        store: Arc<dyn KeyStore>,
    ) -> CryptoResult<TokenService<SymmetricEngine>> {
        let manager = KeyManager::new_issuer(config, store, SymmetricEngine::new())?;
        Ok(TokenService::new(Arc::new(manager)))
    }

    /// Build an initialized issuer and a token service for signed tokens
    ///
    /// Tokens are signed with Ed25519 and encrypted to the active X25519
    /// key. The public key set can be handed to external verifiers.
    pub fn asymmetric_token_service(
        config: KeyManagerConfig,
        store: Arc<dyn KeyStore>,
    ) -> CryptoResult<TokenService<AsymmetricEngine>> {
        let manager = KeyManager::new_issuer(config, store, AsymmetricEngine::new())?;
        Ok(TokenService::new(Arc::new(manager)))
    }
}
