use super::*;
use crate::aead::ContentCipher;
use crate::error::CryptoError;
use crate::key_management::{KeyRecord, PublicKeySet};
use crate::utils;

fn fresh(engine: &dyn EncryptionEngine) -> KeyRecord {
    engine.generate_record(Duration::hours(1)).unwrap()
}

fn decode_header(token: &str) -> Map<String, Value> {
    let first = token.split('.').next().unwrap();
    serde_json::from_slice(&utils::b64_decode(first, "header").unwrap()).unwrap()
}

/// Flip one bit in the decoded bytes of part `index`
fn tamper(token: &str, index: usize) -> String {
    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let mut bytes = utils::b64_decode(&parts[index], "part").unwrap();
    bytes[0] ^= 0x01;
    parts[index] = utils::b64_encode(&bytes);
    parts.join(".")
}

#[test]
fn test_symmetric_round_trip_and_header() {
    let engine = SymmetricEngine::new();
    let key = fresh(&engine);
    let options = EncryptOptions::new()
        .with_expires_in(std::time::Duration::from_secs(60))
        .with_header("tenant", "acme");

    let token = engine.encrypt(b"secret payload", &key, &options).unwrap();
    assert_eq!(token.split('.').count(), 5);

    let header = decode_header(&token);
    let names: Vec<&str> = header.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["alg", "enc", "kid", "salt", "iat", "exp", "tenant"]);
    assert_eq!(header["alg"], "dir");
    assert_eq!(header["kid"], key.id());
    assert_eq!(utils::b64_decode(header["salt"].as_str().unwrap(), "salt").unwrap().len(), 32);

    assert_eq!(engine.decrypt(&token, &[&key]).unwrap(), b"secret payload");
}

#[test]
fn test_symmetric_falls_back_to_history() {
    let engine = SymmetricEngine::new();
    let old = fresh(&engine);
    let new = fresh(&engine);
    let token = engine.encrypt(b"issued before rotation", &old, &EncryptOptions::new()).unwrap();

    assert_eq!(engine.decrypt(&token, &[&new, &old]).unwrap(), b"issued before rotation");
    assert!(matches!(
        engine.decrypt(&token, &[&new]),
        Err(CryptoError::DecryptionFailed { .. })
    ));
    assert!(matches!(
        engine.decrypt(&token, &[]),
        Err(CryptoError::DecryptionFailed { .. })
    ));
}

#[test]
fn test_expired_token_fails_before_key_trial() {
    let engine = SymmetricEngine::new();
    let key = fresh(&engine);
    let past = utils::unix_now() - 10;
    let token = engine
        .encrypt(b"late", &key, &EncryptOptions::new().with_expires_at(past))
        .unwrap();

    // Even with no candidate keys the error is Expired, not DecryptionFailed
    match engine.decrypt(&token, &[]) {
        Err(CryptoError::Expired { expired_at, .. }) => assert_eq!(expired_at, past),
        other => panic!("expected Expired, got {:?}", other),
    }
}

#[test]
fn test_reserved_headers_rejected() {
    let engine = SymmetricEngine::new();
    let key = fresh(&engine);
    for name in RESERVED_HEADERS {
        let options = EncryptOptions::new().with_header(*name, "override");
        assert!(matches!(
            engine.encrypt(b"x", &key, &options),
            Err(CryptoError::InvalidParameter { .. })
        ));
    }
}

#[test]
fn test_tampering_detected_in_every_part() {
    for engine in [&SymmetricEngine::new() as &dyn EncryptionEngine, &AsymmetricEngine::new()] {
        let key = fresh(engine);
        let token = engine.encrypt(b"integrity matters", &key, &EncryptOptions::new()).unwrap();

        for index in [2usize, 3, 4] {
            assert!(engine.decrypt(&tamper(&token, index), &[&key]).is_err());
        }

        // Changing a header value changes the associated data
        let mut header = decode_header(&token);
        header.insert("iat".to_string(), Value::from(1));
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_header = utils::b64_encode(&serde_json::to_vec(&header).unwrap());
        parts[0] = &forged_header;
        assert!(engine.decrypt(&parts.join("."), &[&key]).is_err());
    }
}

#[test]
fn test_malformed_tokens() {
    let engine = SymmetricEngine::new();
    let key = fresh(&engine);
    for bad in ["", "a.b", "a.b.c.d.e", "e30..AAAA.AAAA.AAAA", "not base64!..x.y.z"] {
        assert!(matches!(
            engine.decrypt(bad, &[&key]),
            Err(CryptoError::MalformedToken { .. })
        ));
    }

    let huge = "a".repeat(MAX_TOKEN_LEN + 1);
    assert!(matches!(
        engine.decrypt(&huge, &[&key]),
        Err(CryptoError::MalformedToken { .. })
    ));
}

#[test]
fn test_chacha_content_cipher() {
    let engine = SymmetricEngine::new();
    let key = fresh(&engine);
    let options = EncryptOptions::new().with_cipher(ContentCipher::ChaCha20Poly1305);
    let token = engine.encrypt(b"chacha", &key, &options).unwrap();
    assert_eq!(decode_header(&token)["enc"], "C20P");
    assert_eq!(engine.decrypt(&token, &[&key]).unwrap(), b"chacha");
}

#[test]
fn test_symmetric_engine_cannot_sign() {
    let engine = SymmetricEngine::new();
    let key = fresh(&engine);
    assert!(!engine.supports_signing());
    assert!(matches!(
        engine.sign(b"x", &key),
        Err(CryptoError::UnsupportedOperation { .. })
    ));
}

#[test]
fn test_asymmetric_round_trip() {
    let engine = AsymmetricEngine::new();
    let key = fresh(&engine);
    assert_eq!(key.id().len(), asymmetric::KEY_ID_LEN);

    let token = engine.encrypt(b"for the holder", &key, &EncryptOptions::new()).unwrap();
    let header = decode_header(&token);
    assert_eq!(header["alg"], "ECDH-ES");
    assert_eq!(header["epk"]["crv"], "X25519");
    assert!(header.get("salt").is_none());

    let other = fresh(&engine);
    assert_eq!(engine.decrypt(&token, &[&other, &key]).unwrap(), b"for the holder");
    assert!(engine.decrypt(&token, &[&other]).is_err());
}

#[test]
fn test_wrong_scheme_rejected_by_engine() {
    let symmetric = SymmetricEngine::new();
    let asymmetric = AsymmetricEngine::new();
    let sym_key = fresh(&symmetric);
    let asym_key = fresh(&asymmetric);

    assert!(asymmetric.encrypt(b"x", &sym_key, &EncryptOptions::new()).is_err());
    let token = symmetric.encrypt(b"x", &sym_key, &EncryptOptions::new()).unwrap();
    assert!(asymmetric.decrypt(&token, &[&asym_key]).is_err());
}

#[test]
fn test_sign_and_verify_across_rotation() {
    let engine = AsymmetricEngine::new();
    let old = fresh(&engine);
    let new = fresh(&engine);

    let jws = engine.sign(br#"{"sub":"alice"}"#, &old).unwrap();
    assert_eq!(jws.split('.').count(), 3);
    assert_eq!(engine.verify(&jws, &[&new, &old]).unwrap(), br#"{"sub":"alice"}"#);
    assert!(matches!(
        engine.verify(&jws, &[&new]),
        Err(CryptoError::VerificationFailed { .. })
    ));

    let mut forged: Vec<&str> = jws.split('.').collect();
    let other_payload = utils::b64_encode(br#"{"sub":"mallory"}"#);
    forged[1] = &other_payload;
    assert!(engine.verify(&forged.join("."), &[&new, &old]).is_err());
}

#[test]
fn test_public_key_paths() {
    let engine = AsymmetricEngine::new();
    let key = fresh(&engine);
    let set = PublicKeySet {
        keys: vec![key.public_key().unwrap()],
    };

    let jws = engine.sign(b"signed", &key).unwrap();
    assert_eq!(engine.verify_with_public_keys(&jws, &set).unwrap(), b"signed");

    let token = engine
        .encrypt_to(b"sealed for holder", &set.keys[0], &EncryptOptions::new())
        .unwrap();
    assert_eq!(engine.decrypt(&token, &[&key]).unwrap(), b"sealed for holder");
}

#[test]
fn test_generate_record_out_of_range_lifetime() {
    let lifetime = Duration::days(1_000_000 * 365);
    let symmetric = SymmetricEngine::new();
    let asymmetric = AsymmetricEngine::new();
    let engines: [&dyn EncryptionEngine; 2] = [&symmetric, &asymmetric];
    for engine in engines {
        assert!(matches!(
            engine.generate_record(lifetime),
            Err(CryptoError::InvalidParameter { .. })
        ));
    }
}
