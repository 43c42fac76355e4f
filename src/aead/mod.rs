/*!
 * Authenticated encryption for token content
 *
 * This module wraps AES-256-GCM and ChaCha20-Poly1305 behind the
 * `ContentCipher` selector used by the token envelope.
 */

mod aes;

pub use aes::*;
