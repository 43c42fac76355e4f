use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};

use crate::error::{error_codes, CryptoError, CryptoResult};

/// Generate random bytes of the specified length from the OS generator
pub fn random_bytes(length: usize) -> CryptoResult<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        CryptoError::generation_error(
            "random_bytes",
            &e.to_string(),
            error_codes::KEY_GENERATION_FAILED,
        )
    })?;
    Ok(bytes)
}

/// Generate a random alphanumeric identifier, used for key ids
pub fn random_key_id(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Encode bytes as unpadded base64url, the encoding used by token parts
pub fn b64_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode an unpadded base64url token part
pub fn b64_decode(part: &str, what: &str) -> CryptoResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| CryptoError::malformed(&format!("{} is not valid base64url", what)))
}

/// Current time as seconds since the Unix epoch
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Instant `lifetime` after `start`, or `InvalidParameter` when it falls
/// outside the representable date range
pub fn expiry_after(
    start: chrono::DateTime<chrono::Utc>,
    lifetime: chrono::Duration,
) -> CryptoResult<chrono::DateTime<chrono::Utc>> {
    start.checked_add_signed(lifetime).ok_or_else(|| {
        CryptoError::invalid_parameter(
            "key lifetime",
            "an expiry within the supported date range",
            &format!("{}s after {}", lifetime.num_seconds(), start.to_rfc3339()),
        )
    })
}

/// Concatenate multiple byte slices efficiently
pub fn concat_bytes(slices: &[&[u8]]) -> Vec<u8> {
    let total_len = slices.iter().map(|s| s.len()).sum();
    let mut result = Vec::with_capacity(total_len);
    for slice in slices {
        result.extend_from_slice(slice);
    }
    result
}
