//! Secure Memory Handling Utilities
//!
//! Containers for key material and derived keys. Contents are zeroed when
//! dropped and never appear in `Debug` output, so a key record can be logged
//! or printed without leaking its secret half.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A container for sensitive bytes that is zeroed on drop.
///
/// # Example
///
/// ```
/// use keyseal::secure_memory::SecureBytes;
///
/// let key = SecureBytes::new(&[0x01, 0x02, 0x03, 0x04]);
/// assert_eq!(key.len(), 4);
/// assert_eq!(format!("{:?}", key), "SecureBytes([REDACTED; 4 bytes])");
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes {
    bytes: Vec<u8>,
}

impl SecureBytes {
    /// Create a new SecureBytes holding a copy of `data`
    pub fn new(data: &[u8]) -> Self {
        Self {
            bytes: data.to_vec(),
        }
    }

    /// Get a reference to the underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the current length of the buffer in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes([REDACTED; {} bytes])", self.bytes.len())
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_bytes_redacted_debug() {
        let secret = SecureBytes::new(b"super secret key material");
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("super"));
        assert!(printed.contains("REDACTED"));
    }

    #[test]
    fn test_secure_bytes_zeroize() {
        let mut secret = SecureBytes::from(vec![1, 2, 3, 4]);
        secret.zeroize();
        assert!(secret.is_empty());
    }

    #[test]
    fn test_secure_bytes_clone_is_independent() {
        let original = SecureBytes::new(&[9; 32]);
        let mut copy = original.clone();
        copy.zeroize();
        assert_eq!(original.as_bytes(), &[9; 32]);
    }
}
