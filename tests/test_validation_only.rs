// Validation-only managers share a store with an issuer but never write to it

use keyseal::key_management::{SplitStoreAdapter, InMemorySplitStore};
use keyseal::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn issuer_with_store<E: EncryptionEngine>(engine: E) -> (Arc<InMemoryKeyStore>, KeyManager<E>) {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyManager::new_issuer(
        KeyManagerConfig::new(Duration::from_secs(3600), Some(3)),
        store.clone(),
        engine,
    )
    .unwrap();
    (store, manager)
}

#[test]
fn test_validator_decrypts_what_issuer_wrote() {
    let (store, issuer) = issuer_with_store(SymmetricEngine::new());
    let old = issuer.encrypt(b"before", &EncryptOptions::new()).unwrap();
    issuer.rotate_key().unwrap();
    let new = issuer.encrypt(b"after", &EncryptOptions::new()).unwrap();

    let validator =
        KeyManager::validation_only(KeyManagerConfig::default(), store.clone(), SymmetricEngine::new())
            .unwrap();
    assert_eq!(validator.active_key().unwrap().id(), issuer.active_key().unwrap().id());
    assert_eq!(validator.history().len(), 1);
    assert_eq!(validator.decrypt(&old).unwrap(), b"before");
    assert_eq!(validator.decrypt(&new).unwrap(), b"after");
}

#[test]
fn test_validator_cannot_mutate() {
    let (store, _issuer) = issuer_with_store(AsymmetricEngine::new());
    let validator =
        KeyManager::validation_only(KeyManagerConfig::default(), store.clone(), AsymmetricEngine::new())
            .unwrap();
    let stored_before = store.len();

    for result in [
        validator.rotate_key(),
        validator.rotate_if_needed().map(|_| ()),
        validator.encrypt(b"x", &EncryptOptions::new()).map(|_| ()),
        validator.sign(b"x").map(|_| ()),
    ] {
        match result {
            Err(err @ CryptoError::ModeError { .. }) => {
                assert!(err.to_string().contains("validation only mode"));
            }
            other => panic!("expected ModeError, got {:?}", other),
        }
    }
    assert_eq!(store.len(), stored_before);
}

#[test]
fn test_validator_verifies_signed_tokens() {
    let (store, issuer) = issuer_with_store(AsymmetricEngine::new());
    let issuer = TokenService::new(Arc::new(issuer));
    let token = issuer.issue(&Claims::new().with("sub", "erin"), None).unwrap();

    let validator = TokenService::new(Arc::new(
        KeyManager::validation_only(KeyManagerConfig::default(), store, AsymmetricEngine::new())
            .unwrap(),
    ));
    assert_eq!(validator.parse(&token).unwrap().get_str("sub"), Some("erin"));
    assert!(validator.issue(&Claims::new(), None).is_err());
}

#[test]
fn test_public_key_set_verifies_without_private_keys() {
    let (_store, issuer) = issuer_with_store(AsymmetricEngine::new());
    let signed = issuer.sign(b"{\"sub\":\"frank\"}").unwrap();
    issuer.rotate_key().unwrap();

    let published = issuer.public_key_set().unwrap().to_json().unwrap();
    assert!(published.contains("\"keys\""));
    let keys = PublicKeySet::from_json(&published).unwrap();
    assert_eq!(keys.len(), 2);

    let engine = AsymmetricEngine::new();
    assert_eq!(
        engine.verify_with_public_keys(&signed, &keys).unwrap(),
        b"{\"sub\":\"frank\"}"
    );
}

#[test]
fn test_validator_over_split_store() {
    let store = Arc::new(SplitStoreAdapter::new(InMemorySplitStore::new()));
    let issuer = KeyManager::new_issuer(
        KeyManagerConfig::new(Duration::from_secs(3600), Some(2)),
        store.clone(),
        SymmetricEngine::new(),
    )
    .unwrap();
    let token = issuer.encrypt(b"split", &EncryptOptions::new()).unwrap();
    issuer.rotate_key().unwrap();

    let validator =
        KeyManager::validation_only(KeyManagerConfig::default(), store, SymmetricEngine::new())
            .unwrap();
    assert_eq!(validator.decrypt(&token).unwrap(), b"split");
}
